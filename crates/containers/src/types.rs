//! Core container types shared by the manager and client.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    Stopped,
    Starting,
    Running,
    Crashed,
}

/// In-memory record of one agent's container. One per configured agent
/// slug, created lazily on first `ensure_running`.
#[derive(Debug, Clone)]
pub struct Container {
    pub agent_slug: String,
    pub runtime_status: RuntimeStatus,
    pub host_port: Option<u16>,
    pub container_name: String,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Container {
    pub fn new(agent_slug: impl Into<String>) -> Self {
        let agent_slug = agent_slug.into();
        let container_name = format!("superagent-{agent_slug}");
        Container {
            agent_slug,
            runtime_status: RuntimeStatus::Stopped,
            host_port: None,
            container_name,
            started_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub memory_limit_bytes: u64,
}
