//! Session metadata store.
//!
//! Persists one JSON file per agent (`<data_root>/<agent_slug>/sessions.json`)
//! mapping session ID to its metadata. The transcript itself lives
//! separately as JSONL (see `crate::jsonl`); this store only tracks the
//! bookkeeping a client needs to list and address sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Active,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub agent_slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Per-agent session metadata store, backed by a JSON file under that
/// agent's data directory.
pub struct SessionStore {
    path: PathBuf,
    sessions: RwLock<HashMap<String, SessionMeta>>,
}

impl SessionStore {
    pub fn load(agent_data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(agent_data_dir)?;
        let path = agent_data_dir.join("sessions.json");
        let sessions = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(SessionStore {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    pub fn get(&self, session_id: &str) -> Option<SessionMeta> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn create(&self, agent_slug: &str) -> SessionMeta {
        let now = Utc::now();
        let meta = SessionMeta {
            id: uuid::Uuid::new_v4().to_string(),
            agent_slug: agent_slug.to_string(),
            created_at: now,
            updated_at: now,
            status: SessionStatus::Idle,
            last_error: None,
        };
        self.sessions.write().insert(meta.id.clone(), meta.clone());
        meta
    }

    pub fn set_status(&self, session_id: &str, status: SessionStatus) {
        let mut sessions = self.sessions.write();
        if let Some(meta) = sessions.get_mut(session_id) {
            meta.status = status;
            meta.updated_at = Utc::now();
            if status != SessionStatus::Error {
                meta.last_error = None;
            }
        }
    }

    pub fn set_error(&self, session_id: &str, message: String) {
        let mut sessions = self.sessions.write();
        if let Some(meta) = sessions.get_mut(session_id) {
            meta.status = SessionStatus::Error;
            meta.last_error = Some(message);
            meta.updated_at = Utc::now();
        }
    }

    pub fn list(&self) -> Vec<SessionMeta> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn delete(&self, session_id: &str) -> Option<SessionMeta> {
        self.sessions.write().remove(session_id)
    }

    pub fn flush(&self) -> Result<()> {
        let sessions = self.sessions.read();
        let json = serde_json::to_string_pretty(&*sessions)
            .map_err(|e| Error::PersistenceError(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(dir.path()).unwrap();
        let meta = store.create("agent1");
        let fetched = store.get(&meta.id).unwrap();
        assert_eq!(fetched.agent_slug, "agent1");
        assert_eq!(fetched.status, SessionStatus::Idle);
    }

    #[test]
    fn set_status_clears_last_error_on_non_error_transition() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(dir.path()).unwrap();
        let meta = store.create("agent1");
        store.set_error(&meta.id, "boom".into());
        store.set_status(&meta.id, SessionStatus::Idle);
        let fetched = store.get(&meta.id).unwrap();
        assert_eq!(fetched.status, SessionStatus::Idle);
        assert!(fetched.last_error.is_none());
    }

    #[test]
    fn flush_and_reload_preserves_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(dir.path()).unwrap();
        let meta = store.create("agent1");
        store.flush().unwrap();

        let reloaded = SessionStore::load(dir.path()).unwrap();
        assert!(reloaded.get(&meta.id).is_some());
    }

    #[test]
    fn delete_removes_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(dir.path()).unwrap();
        let meta = store.create("agent1");
        assert!(store.delete(&meta.id).is_some());
        assert!(store.get(&meta.id).is_none());
    }
}
