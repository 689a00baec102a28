//! The session SSE endpoint. Grounded on the teacher's
//! `schedule_events_sse` (`async_stream::stream!` over a
//! `broadcast::Receiver`, `Lagged` tolerated by skipping ahead) with the
//! Realtime Event Bus's keep-alive loop layered on top.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use sa_domain::error::Error;

use crate::api::ApiError;
use crate::pump;
use crate::state::AppState;

/// Aborts the keep-alive ping task when the SSE response stream is
/// dropped — the only signal axum gives us for "client disconnected".
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub async fn stream_session(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state
        .sessions
        .get(&id)
        .ok_or_else(|| Error::SessionNotFound(id.clone()))?;

    pump::ensure_pump(&state, &slug, &id);

    let is_active = state.session_locks.is_active(&id);
    let (connected, mut events) = state.event_bus.subscribe(&id, is_active);
    let keepalive = AbortOnDrop(state.event_bus.spawn_keepalive(id.clone(), is_active));

    let body_stream = async_stream::stream! {
        let _keepalive = keepalive;
        yield Ok::<Bytes, std::convert::Infallible>(Bytes::from(connected.to_sse()));
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => yield Ok(Bytes::from(event.to_sse())),
                Err(BroadcastStreamRecvError::Lagged(_)) => continue,
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(body_stream))
        .map_err(|e| Error::Http(e.to_string()).into())
}
