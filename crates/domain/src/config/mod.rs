mod agents;
mod containers;
mod observability;
mod scheduler;
mod server;

pub use agents::*;
pub use containers::*;
pub use observability::*;
pub use scheduler::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub containers: ContainersConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Agent slug -> agent container config.
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
}

/// Non-fatal config problems surfaced to the CLI's `config validate`/`doctor`
/// paths. Distinct from hard parse errors, which fail loading outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

impl Config {
    /// Load from a TOML file, falling back to defaults if the file is
    /// absent. Parse errors are propagated.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&raw)
            .map_err(|e| crate::error::Error::Config(format!("{}: {e}", path.display())))?;
        Ok(cfg)
    }

    /// Structural validation beyond what serde defaults can express.
    /// Returns a list of (severity, message) findings; an empty list means
    /// the config passed.
    pub fn validate(&self) -> Vec<(ConfigSeverity, String)> {
        let mut findings = Vec::new();
        if self.agents.is_empty() {
            findings.push((
                ConfigSeverity::Warning,
                "no agents configured — the container manager has nothing to start".into(),
            ));
        }
        if self.scheduler.tick_secs == 0 || self.scheduler.tick_secs > 60 {
            findings.push((
                ConfigSeverity::Error,
                format!(
                    "scheduler.tick_secs must be in 1..=60, got {}",
                    self.scheduler.tick_secs
                ),
            ));
        }
        for (slug, agent) in &self.agents {
            if agent.image.trim().is_empty() {
                findings.push((
                    ConfigSeverity::Error,
                    format!("agent '{slug}' has an empty image reference"),
                ));
            }
        }
        findings
    }
}
