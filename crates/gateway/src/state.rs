//! Shared application state, constructed once in `main` and cloned into
//! every request handler and background task.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use sa_containers::{ContainerManager, ShutdownCoordinator};
use sa_domain::config::Config;
use sa_eventbus::EventBus;
use sa_scheduler::ScheduleStore;
use sa_sessions::{CancelMap, SessionLockMap, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Path the config was loaded from, kept for `PUT /api/settings` to
    /// write back to the same file.
    pub config_path: PathBuf,

    pub containers: Arc<ContainerManager>,
    pub sessions: Arc<SessionStore>,
    pub event_bus: Arc<EventBus>,
    pub scheduler: Arc<ScheduleStore>,
    pub session_locks: Arc<SessionLockMap>,
    pub cancel_map: Arc<CancelMap>,
    pub shutdown: Arc<ShutdownCoordinator>,

    /// Session IDs with a live stream-pump task consuming the
    /// container's WS stream. Prevents double-subscribing the same
    /// session from two concurrent requests.
    pub pumps: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    /// Root directory for one agent's on-disk state
    /// (`<data_root>/<slug>/{workspace,sessions,subagents}`).
    pub fn agent_dir(&self, agent_slug: &str) -> PathBuf {
        self.config.containers.data_root.join(agent_slug)
    }

    pub fn sessions_dir(&self, agent_slug: &str) -> PathBuf {
        self.agent_dir(agent_slug).join("sessions")
    }

    pub fn subagents_dir(&self, agent_slug: &str) -> PathBuf {
        self.agent_dir(agent_slug).join("subagents")
    }
}

/// Builds a throwaway `AppState` backed by a temp directory, for use by
/// other modules' test suites. Not behind a feature flag since
/// `#[cfg(test)]` already keeps it out of release builds.
#[cfg(test)]
pub(crate) fn test_state(dir: &std::path::Path) -> AppState {
    let config = Arc::new(Config::default());
    let containers = Arc::new(ContainerManager::new(
        config.agents.clone(),
        config.containers.clone(),
    ));
    AppState {
        config: config.clone(),
        config_path: dir.join("config.toml"),
        containers: containers.clone(),
        sessions: Arc::new(SessionStore::load(dir).unwrap()),
        event_bus: Arc::new(EventBus::new()),
        scheduler: Arc::new(ScheduleStore::load(dir).unwrap()),
        session_locks: Arc::new(SessionLockMap::new()),
        cancel_map: Arc::new(CancelMap::new()),
        shutdown: Arc::new(ShutdownCoordinator::new(containers)),
        pumps: Arc::new(Mutex::new(HashSet::new())),
    }
}
