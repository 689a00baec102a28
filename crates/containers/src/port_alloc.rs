//! Host port allocation for container publishing.

use std::collections::HashSet;

use sa_domain::error::{Error, Result};

use crate::runtime_cli::{get_used_ports, RunnerKind};

/// Scan ports already published by the runtime and return the first
/// free port at or above `base_port`. Does not reserve the port; the
/// caller must publish it promptly to avoid a race against another
/// `ensure_running` call.
pub async fn allocate_port(runner: RunnerKind, base_port: u16) -> Result<u16> {
    let used = get_used_ports(runner).await.unwrap_or_default();
    find_free_port(&used, base_port)
}

fn find_free_port(used: &HashSet<u16>, base_port: u16) -> Result<u16> {
    for candidate in base_port..=u16::MAX {
        if !used.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(Error::RuntimeUnavailable(
        "no free host port available above the configured base port".into(),
    ))
}
