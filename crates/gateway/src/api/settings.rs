//! Static configuration inspection and replacement. Grounded on the
//! teacher's `api/admin/health.rs::save_config` — validate the
//! candidate TOML parses as `Config`, back up the existing file with a
//! timestamp suffix, then write atomically via a tmp file + rename.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use sa_domain::config::Config;
use sa_domain::error::Error;

use crate::api::ApiError;
use crate::state::AppState;

pub async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(&*state.config).unwrap_or_default())
}

pub async fn put_settings(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let candidate: Config = toml::from_str(&body)
        .map_err(|e| Error::Config(format!("invalid config: {e}")))?;
    let issues = candidate.validate();
    let hard_errors: Vec<_> = issues
        .iter()
        .filter(|(sev, _)| *sev == sa_domain::config::ConfigSeverity::Error)
        .collect();
    if !hard_errors.is_empty() {
        let messages: Vec<&str> = hard_errors.iter().map(|(_, msg)| msg.as_str()).collect();
        return Err(Error::Config(messages.join("; ")).into());
    }

    if state.config_path.exists() {
        let backup_path = state.config_path.with_extension(format!(
            "toml.bak.{}",
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        std::fs::copy(&state.config_path, &backup_path)?;
    }

    let tmp_path = state.config_path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, &body)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp_path, &state.config_path)?;

    Ok(Json(json!({
        "written": true,
        "warnings": issues.len(),
        "restartRequired": true,
    })))
}

#[cfg(test)]
mod tests {
    use axum::extract::State;

    use crate::state::test_state;

    use super::*;

    #[tokio::test]
    async fn get_settings_returns_current_config() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let Json(value) = get_settings(State(state)).await;
        assert_eq!(value["server"]["port"], 3210);
    }

    #[tokio::test]
    async fn put_settings_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let result = put_settings(State(state), "not valid toml {{{".into()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn put_settings_rejects_hard_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let result = put_settings(State(state), "[scheduler]\ntick_secs = 0\n".into()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn put_settings_writes_valid_config_and_backs_up_existing() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(dir.path());
        state.config_path = dir.path().join("config.toml");
        std::fs::write(&state.config_path, "server.port = 3210\n").unwrap();

        let result = put_settings(State(state.clone()), "[server]\nport = 4000\n".into()).await;
        assert!(result.is_ok());
        let written = std::fs::read_to_string(&state.config_path).unwrap();
        assert!(written.contains("4000"));

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".bak."))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
