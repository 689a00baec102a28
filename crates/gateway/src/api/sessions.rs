//! Session CRUD, message posting, and interrupt. Grounded stylistically
//! on the teacher's `api/sessions.rs` handler shape (`State<AppState>` +
//! `Path`/`Json` extractors, `Result<T, ApiError>` returns).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use sa_domain::error::Error;
use sa_sessions::{merge_transcript, SessionStatus, TranscriptStore};

use crate::api::ApiError;
use crate::pump;
use crate::state::AppState;

pub async fn list_sessions(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Json<Value> {
    let sessions: Vec<_> = state
        .sessions
        .list()
        .into_iter()
        .filter(|s| s.agent_slug == slug)
        .collect();
    Json(json!({ "sessions": sessions }))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub initial_message: Option<String>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<Value>, ApiError> {
    if !state.config.agents.contains_key(&slug) {
        return Err(Error::Config(format!("unknown agent '{slug}'")).into());
    }
    let meta = state.sessions.create(&slug);

    let client = state.containers.ensure_running(&slug).await?;
    client.create_session(&meta.id).await?;

    if let Some(message) = &body.initial_message {
        client.send_message(&meta.id, message).await?;
        state.sessions.set_status(&meta.id, SessionStatus::Active);
        pump::ensure_pump(&state, &slug, &meta.id);
    }

    state.sessions.flush()?;
    Ok(Json(serde_json::to_value(&meta).unwrap_or_default()))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path((_slug, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let meta = state.sessions.get(&id).ok_or_else(|| Error::SessionNotFound(id.clone()))?;
    Ok(Json(serde_json::to_value(&meta).unwrap_or_default()))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.sessions.get(&id).ok_or_else(|| Error::SessionNotFound(id.clone()))?;
    if let Some(client) = state.containers.get_client(&slug) {
        let _ = client.delete_session(&id).await;
    }
    state.sessions.delete(&id);
    state.event_bus.remove_channel(&id);
    state.cancel_map.remove(&id);
    state.sessions.flush()?;
    Ok(Json(json!({ "deleted": true })))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.sessions.get(&id).ok_or_else(|| Error::SessionNotFound(id.clone()))?;
    let transcript = TranscriptStore::new(state.sessions_dir(&slug));
    let raw = transcript.read(&id)?;
    let merged = merge_transcript(&raw);
    Ok(Json(json!({ "messages": merged })))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

pub async fn post_message(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
    Json(body): Json<PostMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    state.sessions.get(&id).ok_or_else(|| Error::SessionNotFound(id.clone()))?;

    let _permit = state.session_locks.try_acquire(&id)?;
    let client = state.containers.ensure_running(&slug).await?;

    pump::ensure_pump(&state, &slug, &id);
    state.cancel_map.register(&id);
    state.sessions.set_status(&id, SessionStatus::Active);
    state.event_bus.broadcast(&id, sa_domain::event::Event::SessionActive);

    client.send_message(&id, &body.content).await?;
    Ok(Json(json!({ "accepted": true })))
}

pub async fn interrupt_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let meta = state.sessions.get(&id).ok_or_else(|| Error::SessionNotFound(id.clone()))?;
    let client = state.containers.get_client(&meta.agent_slug).ok_or_else(|| {
        Error::Config(format!("agent '{}' container is not running", meta.agent_slug))
    })?;

    state.cancel_map.interrupt(&id);
    client.interrupt_session(&id).await?;
    Ok(Json(json!({ "success": true })))
}
