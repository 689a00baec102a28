//! The capability interface a running container exposes to the rest of
//! the process: start/stop lifecycle, health, and the session-level
//! HTTP/WS surface the container's own in-process server speaks.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use sa_domain::error::{Error, Result};
use sa_domain::wire::StreamMessage;

use crate::runtime_cli::{parse_apple_inspect, parse_docker_inspect, run_cli, InspectInfo, RunnerKind};
use crate::types::ContainerStats;

/// One client per running container. Holds just enough to address it:
/// which runtime it's under, its CLI name, and the host port it
/// published its internal HTTP/WS server on.
pub struct ContainerClient {
    pub runner: RunnerKind,
    pub container_name: String,
    pub host_port: u16,
    http: reqwest::Client,
}

impl ContainerClient {
    pub fn new(runner: RunnerKind, container_name: String, host_port: u16) -> Self {
        ContainerClient {
            runner,
            container_name,
            host_port,
            http: reqwest::Client::new(),
        }
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.host_port)
    }

    /// `docker run -d --name <name> -p host:internal -e K=V... <image>`.
    pub async fn start(
        &self,
        image: &str,
        internal_port: u16,
        env: &std::collections::HashMap<String, String>,
    ) -> Result<()> {
        let publish = format!("{}:{}", self.host_port, internal_port);
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            self.container_name.clone(),
            "-p".into(),
            publish,
        ];
        for (k, v) in env {
            args.push("-e".into());
            args.push(format!("{k}={v}"));
        }
        args.push(image.to_string());
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = run_cli(self.runner, &args_ref, 30).await?;
        if !out.status.success() {
            return Err(Error::ContainerStartFailed {
                agent_slug: self.container_name.clone(),
                message: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(())
    }

    /// Async stop with a grace-period timeout, tolerating "already gone".
    pub async fn stop(&self, timeout_secs: u64) -> Result<()> {
        let timeout_str = timeout_secs.to_string();
        let out = run_cli(
            self.runner,
            &["stop", "-t", &timeout_str, &self.container_name],
            timeout_secs + 5,
        )
        .await?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if stderr.contains("No such container") {
                return Ok(());
            }
            return Err(Error::TransientRuntime(stderr.into_owned()));
        }
        Ok(())
    }

    /// Best-effort blocking stop for use on the signal-handling path
    /// during process shutdown, where spawning further async work onto
    /// a draining runtime is unreliable.
    pub fn stop_sync(&self, timeout_secs: u64) {
        let timeout_str = timeout_secs.to_string();
        let _ = std::process::Command::new(self.runner.binary())
            .args(["stop", "-t", &timeout_str, &self.container_name])
            .output();
    }

    /// `{runner} inspect <name>`, parsed per-runner.
    pub async fn get_info_from_runtime(&self) -> Result<InspectInfo> {
        let out = run_cli(self.runner, &["inspect", &self.container_name], 10).await?;
        if !out.status.success() {
            return Ok(InspectInfo {
                status: "stopped".into(),
                host_port: None,
            });
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        match self.runner {
            RunnerKind::LocalDocker => parse_docker_inspect(&stdout),
            RunnerKind::AppleContainer => parse_apple_inspect(&stdout),
        }
    }

    /// Generic passthrough to the container's own HTTP API.
    pub async fn fetch(&self, path: &str, method: reqwest::Method, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url(), path);
        let mut req = self.http.request(method, &url);
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| Error::Http(format!("{path}: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Http(format!("{path}: HTTP {}", resp.status())));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| Error::Http(format!("{path}: decode: {e}")))
    }

    pub async fn is_healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url());
        matches!(
            self.http.get(&url).timeout(Duration::from_secs(3)).send().await,
            Ok(resp) if resp.status().is_success()
        )
    }

    /// Poll `is_healthy` with a fixed backoff until it succeeds or the
    /// overall deadline elapses.
    pub async fn wait_for_healthy(&self, timeout_secs: u64) -> Result<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            if self.is_healthy().await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::ContainerStartFailed {
                    agent_slug: self.container_name.clone(),
                    message: format!("not healthy after {timeout_secs}s"),
                });
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// `{runner} stats --no-stream <name>`, reduced to the three numbers
    /// the readiness/metrics surface needs.
    pub async fn get_stats(&self) -> Result<ContainerStats> {
        let out = run_cli(
            self.runner,
            &[
                "stats",
                "--no-stream",
                "--format",
                "{{.CPUPerc}}|{{.MemUsage}}",
                &self.container_name,
            ],
            10,
        )
        .await?;
        let text = String::from_utf8_lossy(&out.stdout);
        parse_stats_line(text.lines().next().unwrap_or(""))
    }

    pub async fn create_session(&self, session_id: &str) -> Result<Value> {
        self.fetch(
            "/sessions",
            reqwest::Method::POST,
            Some(serde_json::json!({ "sessionId": session_id })),
        )
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Value> {
        self.fetch(&format!("/sessions/{session_id}"), reqwest::Method::GET, None)
            .await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.fetch(&format!("/sessions/{session_id}"), reqwest::Method::DELETE, None)
            .await
            .map(|_| ())
    }

    pub async fn send_message(&self, session_id: &str, prompt: &str) -> Result<Value> {
        self.fetch(
            &format!("/sessions/{session_id}/messages"),
            reqwest::Method::POST,
            Some(serde_json::json!({ "prompt": prompt })),
        )
        .await
    }

    pub async fn get_messages(&self, session_id: &str) -> Result<Value> {
        self.fetch(
            &format!("/sessions/{session_id}/messages"),
            reqwest::Method::GET,
            None,
        )
        .await
    }

    pub async fn interrupt_session(&self, session_id: &str) -> Result<()> {
        self.fetch(
            &format!("/sessions/{session_id}/interrupt"),
            reqwest::Method::POST,
            None,
        )
        .await
        .map(|_| ())
    }

    /// Open the container's `WS /sessions/{id}/stream` and hand back the
    /// decoded frame stream. Decode errors surface as
    /// `Error::MalformedStreamEvent` on the individual item rather than
    /// terminating the connection.
    pub async fn subscribe_to_stream(
        &self,
        session_id: &str,
    ) -> Result<impl futures_util::Stream<Item = Result<StreamMessage>>> {
        let url = format!("ws://127.0.0.1:{}/sessions/{session_id}/stream", self.host_port);
        let (ws, _resp) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| Error::Http(format!("stream connect {session_id}: {e}")))?;
        let (_write, read) = ws.split();
        Ok(read.map(|msg| match msg {
            Ok(WsMessage::Text(text)) => serde_json::from_str::<StreamMessage>(&text)
                .map_err(|e| Error::MalformedStreamEvent(format!("{e}: {text}"))),
            Ok(WsMessage::Close(_)) => Err(Error::MalformedStreamEvent("stream closed".into())),
            Ok(_) => Err(Error::MalformedStreamEvent("non-text frame".into())),
            Err(e) => Err(Error::Http(format!("stream read: {e}"))),
        }))
    }
}

fn parse_stats_line(line: &str) -> Result<ContainerStats> {
    let mut parts = line.splitn(2, '|');
    let cpu_str = parts.next().unwrap_or("0%").trim_end_matches('%');
    let mem_part = parts.next().unwrap_or("0B / 0B");
    let cpu_percent: f64 = cpu_str.parse().unwrap_or(0.0);
    let (used, limit) = mem_part.split_once('/').unwrap_or(("0B", "0B"));
    Ok(ContainerStats {
        cpu_percent,
        memory_bytes: parse_byte_size(used.trim()),
        memory_limit_bytes: parse_byte_size(limit.trim()),
    })
}

fn parse_byte_size(s: &str) -> u64 {
    let s = s.trim();
    let (num_part, mult) = if let Some(n) = s.strip_suffix("GiB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MiB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("KiB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1)
    } else {
        (s, 1)
    };
    num_part.trim().parse::<f64>().unwrap_or(0.0) as u64 * mult
}
