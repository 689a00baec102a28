//! The public HTTP surface. Grounded on the teacher's `api::router`
//! shape — one `axum::Router<AppState>` assembled from per-concern
//! submodules, error mapping centralized in one `IntoResponse` impl so
//! handlers just return `Result<T, ApiError>`.

pub mod health;
pub mod scheduled_tasks;
pub mod sessions;
pub mod settings;
pub mod stream;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use axum::Json;
use serde_json::json;

use sa_domain::error::Error;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api/settings", get(settings::get_settings).put(settings::put_settings))
        .route(
            "/api/agents/:slug/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/agents/:slug/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route(
            "/api/agents/:slug/sessions/:id/messages",
            get(sessions::get_messages).post(sessions::post_message),
        )
        .route(
            "/api/agents/:slug/sessions/:id/stream",
            get(stream::stream_session),
        )
        .route(
            "/api/sessions/:id/interrupt",
            post(sessions::interrupt_session),
        )
        .route(
            "/api/agents/:slug/scheduled-tasks",
            get(scheduled_tasks::list).post(scheduled_tasks::create),
        )
        .route(
            "/api/agents/:slug/scheduled-tasks/:id",
            get(scheduled_tasks::get).delete(scheduled_tasks::cancel),
        )
        .route(
            "/api/agents/:slug/scheduled-tasks/:id/run-now",
            post(scheduled_tasks::run_now),
        )
        .route(
            "/api/agents/:slug/scheduled-tasks/:id/reset",
            post(scheduled_tasks::reset),
        )
}

/// Uniform error response for every handler in this module: `Error`
/// variants map to a status code via `status_hint`, with the message
/// carried as `{"error": "..."}`.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_hint()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
