//! Process readiness, distinct from a container's own `/health`.
//! Grounded on the teacher's `api/admin/health.rs::health` handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let running = state.containers.get_running_agent_ids();
    let configured = state.config.agents.len();

    if configured > 0 && running.is_empty() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "RUNTIME_UNAVAILABLE",
                "configuredAgents": configured,
                "runningAgents": running,
            })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "configuredAgents": configured,
            "runningAgents": running,
        })),
    )
}
