use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for one agent's container.
///
/// The core does not define what an agent *is* — that's a collaborator's
/// concern — it only reads the fields needed to start and run the
/// container: which image to run, what env vars to pass in, and a
/// resource ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Container image reference (`myorg/agent-base:latest`).
    pub image: String,
    /// Build context directory, used when `image` is not locally available.
    #[serde(default)]
    pub build_context: Option<String>,
    /// Env vars merged into the container on start (after process env and
    /// reserved keys). Per-agent secrets are resolved by the caller before
    /// this map reaches the container manager.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Internal port the container's HTTP/WS API listens on.
    #[serde(default = "d_internal_port")]
    pub internal_port: u16,
    #[serde(default)]
    pub limits: AgentResourceLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentResourceLimits {
    /// Memory ceiling passed to the runtime CLI (`"512m"`, `"2g"`, ...).
    #[serde(default)]
    pub memory: Option<String>,
    /// CPU share ceiling (`"1.5"` cores).
    #[serde(default)]
    pub cpus: Option<String>,
}

fn d_internal_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal() {
        let cfg: AgentConfig = toml::from_str(r#"image = "agents/base:latest""#).unwrap();
        assert_eq!(cfg.image, "agents/base:latest");
        assert_eq!(cfg.internal_port, 8080);
        assert!(cfg.env.is_empty());
    }
}
