//! Child-process invocation of the container runtime CLI.
//!
//! Grounded on the same `tokio::process::Command` spawn-and-wait pattern
//! the exec tool uses for arbitrary shell commands, specialized here to
//! the fixed verb set `{run, stop, rm, inspect, list, stats, build, exec}`.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;

use sa_domain::error::{Error, Result};

/// Which container runtime variant is in play. Eligibility is a static
/// platform check; availability is a dynamic CLI/daemon probe. The two
/// are kept separate so the manager can report "eligible but not
/// available" distinctly from "not eligible at all".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    LocalDocker,
    AppleContainer,
}

impl RunnerKind {
    pub fn binary(self) -> &'static str {
        match self {
            RunnerKind::LocalDocker => "docker",
            RunnerKind::AppleContainer => "container",
        }
    }

    /// Static platform eligibility check. Apple's `container` CLI only
    /// makes sense on macOS.
    pub fn is_eligible(self) -> bool {
        match self {
            RunnerKind::LocalDocker => true,
            RunnerKind::AppleContainer => cfg!(target_os = "macos"),
        }
    }

    /// Dynamic probe: is the binary on PATH and does it respond?
    pub async fn is_available(self) -> bool {
        if !self.is_eligible() {
            return false;
        }
        Command::new(self.binary())
            .arg("version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Resolve `"auto"`/`"docker"`/`"apple"` from config into a concrete
    /// runner, preferring the configured choice and falling back through
    /// the remaining eligible+available runners for `"auto"`.
    pub async fn resolve(configured: &str) -> Result<RunnerKind> {
        match configured {
            "docker" => {
                if RunnerKind::LocalDocker.is_available().await {
                    Ok(RunnerKind::LocalDocker)
                } else {
                    Err(Error::RuntimeUnavailable("docker CLI not available".into()))
                }
            }
            "apple" | "apple-container" => {
                if RunnerKind::AppleContainer.is_available().await {
                    Ok(RunnerKind::AppleContainer)
                } else {
                    Err(Error::RuntimeUnavailable(
                        "apple container CLI not available".into(),
                    ))
                }
            }
            _ => {
                for candidate in [RunnerKind::LocalDocker, RunnerKind::AppleContainer] {
                    if candidate.is_eligible() && candidate.is_available().await {
                        return Ok(candidate);
                    }
                }
                Err(Error::RuntimeUnavailable(
                    "no eligible container runtime is available".into(),
                ))
            }
        }
    }
}

/// Result of parsing the runtime's inspect output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectInfo {
    pub status: String,
    pub host_port: Option<u16>,
}

/// Run a runtime CLI subcommand with a bounded timeout. Transient
/// failures (non-zero exit on e.g. `stop` of an already-gone container)
/// are reported as `Ok` with the raw stderr so callers can classify them
/// as `TransientRuntime` rather than a hard error.
pub async fn run_cli(
    runner: RunnerKind,
    args: &[&str],
    timeout_secs: u64,
) -> Result<std::process::Output> {
    let fut = Command::new(runner.binary()).args(args).output();
    match timeout(Duration::from_secs(timeout_secs), fut).await {
        Ok(Ok(out)) => Ok(out),
        Ok(Err(e)) => Err(Error::TransientRuntime(format!(
            "{} {}: {e}",
            runner.binary(),
            args.join(" ")
        ))),
        Err(_) => Err(Error::Timeout(format!(
            "{} {} timed out after {timeout_secs}s",
            runner.binary(),
            args.join(" ")
        ))),
    }
}

/// Parse `docker inspect --format '{{.State.Status}}|{{json .NetworkSettings.Ports}}'`
/// output: a Go-template-produced line of `status|<json ports map>`.
pub fn parse_docker_inspect(stdout: &str) -> Result<InspectInfo> {
    let line = stdout.lines().next().unwrap_or("").trim();
    let mut parts = line.splitn(2, '|');
    let status = parts
        .next()
        .ok_or_else(|| Error::MalformedStreamEvent("empty docker inspect output".into()))?
        .trim()
        .to_string();
    let ports_json = parts.next().unwrap_or("{}").trim();
    let host_port = ports_json
        .contains("HostPort")
        .then(|| extract_first_host_port(ports_json))
        .flatten();
    Ok(InspectInfo { status, host_port })
}

fn extract_first_host_port(ports_json: &str) -> Option<u16> {
    let value: Value = serde_json::from_str(ports_json).ok()?;
    let map = value.as_object()?;
    for bindings in map.values() {
        if let Some(arr) = bindings.as_array() {
            for binding in arr {
                if let Some(p) = binding.get("HostPort").and_then(|v| v.as_str()) {
                    if let Ok(port) = p.parse::<u16>() {
                        return Some(port);
                    }
                }
            }
        }
    }
    None
}

/// Parse `container inspect <name>` output: a plain JSON object (Apple's
/// CLI speaks JSON natively, no Go templating).
pub fn parse_apple_inspect(stdout: &str) -> Result<InspectInfo> {
    let value: Value = serde_json::from_str(stdout)
        .map_err(|e| Error::MalformedStreamEvent(format!("apple inspect JSON: {e}")))?;
    let status = value
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("stopped")
        .to_string();
    let host_port = value
        .get("networks")
        .and_then(|n| n.as_array())
        .and_then(|arr| arr.first())
        .and_then(|n| n.get("hostPort"))
        .and_then(|v| v.as_u64())
        .and_then(|p| u16::try_from(p).ok());
    Ok(InspectInfo { status, host_port })
}

/// Scan the runtime's published ports across all containers into a
/// used-port set, for the port allocator.
pub async fn get_used_ports(runner: RunnerKind) -> Result<HashSet<u16>> {
    let out = run_cli(runner, &["ps", "--format", "{{.Ports}}"], 10).await?;
    let text = String::from_utf8_lossy(&out.stdout);
    let mut used = HashSet::new();
    for line in text.lines() {
        for segment in line.split(',') {
            if let Some((host, _)) = segment.trim().split_once("->") {
                if let Some(port_str) = host.rsplit(':').next() {
                    if let Ok(p) = port_str.trim().parse::<u16>() {
                        used.insert(p);
                    }
                }
            }
        }
    }
    Ok(used)
}
