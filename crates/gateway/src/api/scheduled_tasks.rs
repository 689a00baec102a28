//! Scheduled-task CRUD and the dispatch routine the scheduler's tick
//! loop and the `run-now` endpoint both share. Grounded on
//! `sa_scheduler::{ScheduleStore, ScheduledTask}` and the fixed-format
//! `at`/cron parsers in that crate.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use sa_domain::error::Error;
use sa_scheduler::{cron_next_tz, parse_at_expression, parse_tz, ScheduleType, ScheduledTask};

use crate::api::ApiError;
use crate::pump;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Json<Value> {
    Json(json!({ "tasks": state.scheduler.list_by_agent(&slug) }))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub schedule_type: ScheduleType,
    pub schedule_expression: String,
    pub prompt: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    if !state.config.agents.contains_key(&slug) {
        return Err(Error::Config(format!("unknown agent '{slug}'")).into());
    }

    let next_execution_at = match body.schedule_type {
        ScheduleType::At => parse_at_expression(&body.schedule_expression, Utc::now())?,
        ScheduleType::Cron => {
            cron_next_tz(&body.schedule_expression, &Utc::now(), parse_tz("UTC")).ok_or_else(
                || {
                    Error::ScheduleParseError(format!(
                        "unrecognized cron expression: '{}'",
                        body.schedule_expression
                    ))
                },
            )?
        }
    };

    let mut task = ScheduledTask::new(
        slug,
        body.schedule_type,
        body.schedule_expression,
        body.prompt,
        next_execution_at,
        None,
    );
    task.name = body.name;

    let created = state.scheduler.create(task);
    state.scheduler.flush()?;
    state.event_bus.broadcast(
        &created.id,
        sa_domain::event::Event::ScheduledTaskCreated {
            payload: serde_json::to_value(&created).unwrap_or_default(),
        },
    );
    Ok(Json(serde_json::to_value(&created).unwrap_or_default()))
}

pub async fn get(
    State(state): State<AppState>,
    Path((_slug, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let task = state
        .scheduler
        .get(&id)
        .ok_or_else(|| Error::Other(format!("no such scheduled task: {id}")))?;
    Ok(Json(serde_json::to_value(&task).unwrap_or_default()))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path((_slug, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.scheduler.cancel(&id)?;
    state.scheduler.flush()?;
    Ok(Json(json!({ "cancelled": true })))
}

/// Un-fail or un-cancel a task back to `Pending`, recomputing
/// `next_execution_at` from its original `scheduleExpression` the same
/// way `create` computes it for a brand new task.
pub async fn reset(
    State(state): State<AppState>,
    Path((_slug, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let task = state
        .scheduler
        .get(&id)
        .ok_or_else(|| Error::Other(format!("no such scheduled task: {id}")))?;

    let next_execution_at = match task.schedule_type {
        ScheduleType::At => parse_at_expression(&task.schedule_expression, Utc::now())?,
        ScheduleType::Cron => {
            cron_next_tz(&task.schedule_expression, &Utc::now(), parse_tz("UTC")).ok_or_else(|| {
                Error::ScheduleParseError(format!(
                    "unrecognized cron expression: '{}'",
                    task.schedule_expression
                ))
            })?
        }
    };

    let reset = state.scheduler.reset(&id, next_execution_at)?;
    state.scheduler.flush()?;
    Ok(Json(serde_json::to_value(&reset).unwrap_or_default()))
}

pub async fn run_now(
    State(state): State<AppState>,
    Path((_slug, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let task = state
        .scheduler
        .get(&id)
        .ok_or_else(|| Error::Other(format!("no such scheduled task: {id}")))?;

    let session_id = dispatch_task(&state, &task).await?;
    state
        .scheduler
        .mark_executed(&task.id, &session_id, Utc::now(), None);
    state.scheduler.flush()?;
    Ok(Json(json!({ "sessionId": session_id })))
}

/// Starts (or reuses) the task's agent container, creates a fresh
/// session, sends the task's prompt, and wires up the stream pump so
/// the fired session's output actually gets consumed. Shared by the
/// `run-now` endpoint and the scheduler tick's `TaskDispatcher` impl.
pub async fn dispatch_task(state: &AppState, task: &ScheduledTask) -> sa_domain::error::Result<String> {
    let client = state.containers.ensure_running(&task.agent_slug).await?;
    let meta = state.sessions.create(&task.agent_slug);
    client.create_session(&meta.id).await?;
    client.send_message(&meta.id, &task.prompt).await?;
    state
        .sessions
        .set_status(&meta.id, sa_sessions::SessionStatus::Active);
    state.sessions.flush()?;
    pump::ensure_pump(state, &task.agent_slug, &meta.id);
    Ok(meta.id)
}
