//! The Container Lifecycle Manager: one `ContainerClient` per configured
//! agent, started lazily and kept running until explicit shutdown.
//!
//! Grounded on the teacher's `ProcessManager` registry shape — a
//! `parking_lot::RwLock<HashMap<_, Arc<RwLock<_>>>>` guarding per-entity
//! state so a lookup never blocks on another entity's lifecycle call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use sa_domain::config::{AgentConfig, ContainersConfig};
use sa_domain::error::{Error, Result};

use crate::client::ContainerClient;
use crate::port_alloc::allocate_port;
use crate::runtime_cli::RunnerKind;
use crate::types::{Container, RuntimeStatus};

struct Entry {
    container: Container,
    client: Option<Arc<ContainerClient>>,
}

pub struct ContainerManager {
    agents: HashMap<String, AgentConfig>,
    config: ContainersConfig,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ContainerManager {
    pub fn new(agents: HashMap<String, AgentConfig>, config: ContainersConfig) -> Self {
        ContainerManager {
            agents,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached client, without starting the container. A
    /// client exists once `ensure_running` has started the container at
    /// least once — this returns it even if the container has since
    /// stopped (the caller's subsequent call will simply fail against
    /// a dead client). `None` only for an agent that has never been
    /// started, since a client can't be created without the host port
    /// a start assigns.
    pub fn get_client(&self, agent_slug: &str) -> Option<Arc<ContainerClient>> {
        self.entries.read().get(agent_slug).and_then(|e| e.client.clone())
    }

    /// Only a client whose container is currently `Running` — used by
    /// `ensure_running` to decide whether a fresh start is needed.
    fn get_running_client(&self, agent_slug: &str) -> Option<Arc<ContainerClient>> {
        self.entries
            .read()
            .get(agent_slug)
            .filter(|e| e.container.runtime_status == RuntimeStatus::Running)
            .and_then(|e| e.client.clone())
    }

    /// Six-step startup: resolve runtime, check for an existing running
    /// container for this agent, allocate a port if starting fresh,
    /// launch, wait for health, and record the client. Idempotent: a
    /// concurrent second call observes the first's result once the
    /// entry transitions out of `Starting`.
    pub async fn ensure_running(&self, agent_slug: &str) -> Result<Arc<ContainerClient>> {
        if let Some(client) = self.get_running_client(agent_slug) {
            return Ok(client);
        }
        let agent = self
            .agents
            .get(agent_slug)
            .ok_or_else(|| Error::Config(format!("unknown agent '{agent_slug}'")))?
            .clone();

        {
            let mut entries = self.entries.write();
            let entry = entries
                .entry(agent_slug.to_string())
                .or_insert_with(|| Entry {
                    container: Container::new(agent_slug),
                    client: None,
                });
            if entry.container.runtime_status == RuntimeStatus::Starting {
                return Err(Error::TransientRuntime(format!(
                    "agent '{agent_slug}' is already starting"
                )));
            }
            entry.container.runtime_status = RuntimeStatus::Starting;
        }

        let result = self.start_container(agent_slug, &agent).await;

        let mut entries = self.entries.write();
        let entry = entries.get_mut(agent_slug).expect("entry inserted above");
        match &result {
            Ok(client) => {
                entry.container.runtime_status = RuntimeStatus::Running;
                entry.container.host_port = Some(client.host_port);
                entry.container.started_at = Some(chrono::Utc::now());
                entry.client = Some(client.clone());
            }
            Err(_) => {
                entry.container.runtime_status = RuntimeStatus::Stopped;
                entry.client = None;
            }
        }
        result
    }

    async fn start_container(&self, agent_slug: &str, agent: &AgentConfig) -> Result<Arc<ContainerClient>> {
        let runner = RunnerKind::resolve(&self.config.runner).await?;
        let host_port = allocate_port(runner, self.config.base_port).await?;
        let container_name = format!("superagent-{agent_slug}");
        let client = ContainerClient::new(runner, container_name, host_port);

        info!(agent_slug, host_port, "starting container");
        client.start(&agent.image, agent.internal_port, &agent.env).await?;
        client
            .wait_for_healthy(self.config.health_timeout_secs)
            .await?;
        Ok(Arc::new(client))
    }

    pub fn has_running_agents(&self) -> bool {
        self.entries
            .read()
            .values()
            .any(|e| e.container.runtime_status == RuntimeStatus::Running)
    }

    pub fn get_running_agent_ids(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| e.container.runtime_status == RuntimeStatus::Running)
            .map(|(slug, _)| slug.clone())
            .collect()
    }

    /// Stop every running container concurrently, tolerating individual
    /// failures — shutdown proceeds regardless.
    pub async fn stop_all(&self) {
        let clients: Vec<(String, Arc<ContainerClient>)> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter_map(|(slug, e)| e.client.clone().map(|c| (slug.clone(), c)))
                .collect()
        };
        let stop_timeout = self.config.stop_timeout_secs;
        let futures = clients.into_iter().map(|(slug, client)| async move {
            if let Err(e) = client.stop(stop_timeout).await {
                warn!(agent_slug = %slug, error = %e, "error stopping container");
            }
        });
        futures_util::future::join_all(futures).await;
        self.entries.write().clear();
    }

    /// Blocking best-effort stop for the final moments of process exit,
    /// when spawning further async tasks is unreliable.
    pub fn stop_all_sync(&self) {
        let entries = self.entries.read();
        for entry in entries.values() {
            if let Some(client) = &entry.client {
                client.stop_sync(self.config.stop_timeout_secs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ContainersConfig {
        ContainersConfig::default()
    }

    #[test]
    fn no_running_agents_initially() {
        let manager = ContainerManager::new(HashMap::new(), config());
        assert!(!manager.has_running_agents());
        assert!(manager.get_running_agent_ids().is_empty());
    }

    #[test]
    fn get_client_is_none_for_unknown_agent() {
        let manager = ContainerManager::new(HashMap::new(), config());
        assert!(manager.get_client("nope").is_none());
    }

    #[test]
    fn get_client_returns_cached_client_even_after_the_container_stopped() {
        let manager = ContainerManager::new(HashMap::new(), config());
        let client = Arc::new(ContainerClient::new(RunnerKind::LocalDocker, "superagent-a1".into(), 41000));
        {
            let mut entries = manager.entries.write();
            entries.insert(
                "a1".into(),
                Entry {
                    container: Container::new("a1"),
                    client: Some(client.clone()),
                },
            );
            entries.get_mut("a1").unwrap().container.runtime_status = RuntimeStatus::Stopped;
        }
        assert!(manager.get_client("a1").is_some());
    }

    #[test]
    fn get_client_is_none_when_entry_exists_but_was_never_started() {
        let manager = ContainerManager::new(HashMap::new(), config());
        manager.entries.write().insert(
            "a1".into(),
            Entry {
                container: Container::new("a1"),
                client: None,
            },
        );
        assert!(manager.get_client("a1").is_none());
    }

    #[tokio::test]
    async fn ensure_running_rejects_unknown_agent() {
        let manager = ContainerManager::new(HashMap::new(), config());
        let result = manager.ensure_running("nope").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
