//! Bridges one container's `WS /sessions/{id}/stream` into the event
//! bus and the JSONL transcript.
//!
//! Exactly one pump task runs per session at a time — `ensure_pump`
//! dedupes against `AppState::pumps` so a second SSE subscriber or a
//! second message post doesn't open a competing WS connection to the
//! same container stream. The pump owns the session's `SessionProcessor`
//! for its lifetime and is the only writer to that session's transcript
//! while it runs.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{error, info, warn};

use sa_domain::event::Event;
use sa_sessions::{SessionProcessor, SessionStatus, TranscriptStore};

use crate::state::AppState;

/// Start the stream pump for `session_id` if one isn't already running.
/// Safe to call on every request that touches a session — a no-op when
/// the pump is already live.
pub fn ensure_pump(state: &AppState, agent_slug: &str, session_id: &str) {
    {
        let mut pumps = state.pumps.lock();
        if !pumps.insert(session_id.to_string()) {
            return;
        }
    }
    let state = state.clone();
    let agent_slug = agent_slug.to_string();
    let session_id = session_id.to_string();
    tokio::spawn(async move {
        run_pump(&state, &agent_slug, &session_id).await;
        state.pumps.lock().remove(&session_id);
    });
}

async fn run_pump(state: &AppState, agent_slug: &str, session_id: &str) {
    let client = match state.containers.ensure_running(agent_slug).await {
        Ok(client) => client,
        Err(e) => {
            error!(agent_slug, session_id, error = %e, "pump could not start container");
            state.sessions.set_error(session_id, e.to_string());
            state
                .event_bus
                .broadcast(session_id, Event::SessionError { error: e.to_string() });
            return;
        }
    };

    let stream = match client.subscribe_to_stream(session_id).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(agent_slug, session_id, error = %e, "pump could not subscribe to container stream");
            state.sessions.set_error(session_id, e.to_string());
            state
                .event_bus
                .broadcast(session_id, Event::SessionError { error: e.to_string() });
            return;
        }
    };
    tokio::pin!(stream);

    info!(agent_slug, session_id, "stream pump connected");
    let transcript = TranscriptStore::new(state.sessions_dir(agent_slug));
    let mut processor = SessionProcessor::new(transcript);

    while let Some(item) = stream.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                warn!(agent_slug, session_id, error = %e, "malformed stream frame, skipping");
                continue;
            }
        };
        let events = match processor.process_frame(session_id, &frame) {
            Ok(events) => events,
            Err(e) => {
                warn!(agent_slug, session_id, error = %e, "failed to persist stream frame");
                continue;
            }
        };
        for event in events {
            // `session_active` is broadcast exactly once per turn, by
            // `post_message` at the moment it accepts the user's
            // message — the pump must not re-derive it from the
            // stream itself.
            if matches!(event, Event::SessionIdle) {
                state.sessions.set_status(session_id, SessionStatus::Idle);
            }
            state.event_bus.broadcast(session_id, event);
        }
    }

    info!(agent_slug, session_id, "stream pump disconnected");
    if state.sessions.get(session_id).map(|m| m.status) != Some(SessionStatus::Error) {
        state.sessions.set_status(session_id, SessionStatus::Idle);
        state.event_bus.broadcast(session_id, Event::SessionIdle);
    }
}
