use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Container runtime configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainersConfig {
    /// Which runtime variant to prefer. `"auto"` probes eligibility and
    /// availability in order and picks the first usable one.
    #[serde(default = "d_runner")]
    pub runner: String,
    /// First host port to try when allocating a container's published port.
    #[serde(default = "d_base_port")]
    pub base_port: u16,
    /// Root directory under which each agent's `workspace/`, `sessions/`,
    /// and `subagents/` directories are created.
    #[serde(default = "d_data_root")]
    pub data_root: PathBuf,
    /// How long to poll `/health` before failing startup.
    #[serde(default = "d_health_timeout_secs")]
    pub health_timeout_secs: u64,
    /// Timeout for CLI calls that start a container.
    #[serde(default = "d_start_timeout_secs")]
    pub start_timeout_secs: u64,
    /// Timeout for CLI calls that stop/remove a container (kept short so
    /// shutdown doesn't hang on an unresponsive runtime).
    #[serde(default = "d_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    /// TTL for the cached `getInfo` snapshot used on hot paths.
    #[serde(default = "d_info_cache_ms")]
    pub info_cache_ms: u64,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            runner: d_runner(),
            base_port: d_base_port(),
            data_root: d_data_root(),
            health_timeout_secs: d_health_timeout_secs(),
            start_timeout_secs: d_start_timeout_secs(),
            stop_timeout_secs: d_stop_timeout_secs(),
            info_cache_ms: d_info_cache_ms(),
        }
    }
}

fn d_runner() -> String {
    "auto".into()
}
fn d_base_port() -> u16 {
    41000
}
fn d_data_root() -> PathBuf {
    PathBuf::from("./data/agents")
}
fn d_health_timeout_secs() -> u64 {
    60
}
fn d_start_timeout_secs() -> u64 {
    30
}
fn d_stop_timeout_secs() -> u64 {
    10
}
fn d_info_cache_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ContainersConfig::default();
        assert_eq!(cfg.runner, "auto");
        assert_eq!(cfg.base_port, 41000);
        assert_eq!(cfg.health_timeout_secs, 60);
        assert!(cfg.info_cache_ms <= 1000);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ContainersConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.runner, "auto");
    }
}
