use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use parking_lot::Mutex;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use sa_containers::{ContainerManager, ShutdownCoordinator};
use sa_domain::config::{Config, ConfigSeverity};
use sa_eventbus::EventBus;
use sa_gateway::api;
use sa_gateway::api::scheduled_tasks::dispatch_task;
use sa_gateway::cli::{Cli, Command, ConfigCommand};
use sa_gateway::state::AppState;
use sa_scheduler::{ScheduleStore, ScheduledTask, SchedulerRunner, TaskDispatcher};
use sa_sessions::{CancelMap, SessionLockMap, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, config_path) = sa_gateway::cli::load_config()?;
            run_server(Arc::new(config), config_path).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            let valid = sa_gateway::cli::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = sa_gateway::cli::load_config()?;
            sa_gateway::cli::show(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sa_gateway=debug")),
        )
        .json()
        .init();
}

/// Dispatches a fired scheduled task by handing it to the same
/// container-start / session-create / message-send path an HTTP
/// client would use — a scheduled task fires exactly like a user
/// posting to a brand-new session.
struct GatewayDispatcher(AppState);

#[async_trait]
impl TaskDispatcher for GatewayDispatcher {
    async fn dispatch(&self, task: &ScheduledTask) -> sa_domain::error::Result<String> {
        dispatch_task(&self.0, task).await
    }
}

async fn run_server(config: Arc<Config>, config_path: std::path::PathBuf) -> anyhow::Result<()> {
    tracing::info!("superagent starting");

    let issues = config.validate();
    for (severity, message) in &issues {
        match severity {
            ConfigSeverity::Warning => tracing::warn!("config: {message}"),
            ConfigSeverity::Error => tracing::error!("config: {message}"),
        }
    }
    if issues.iter().any(|(sev, _)| *sev == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|(sev, _)| *sev == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Container manager ────────────────────────────────────────────
    let containers = Arc::new(ContainerManager::new(
        config.agents.clone(),
        config.containers.clone(),
    ));
    tracing::info!(agents = config.agents.len(), "container manager ready");

    // ── Session store ────────────────────────────────────────────────
    let sessions = Arc::new(
        SessionStore::load(&config.containers.data_root)
            .context("loading session store")?,
    );
    tracing::info!("session store ready");

    // ── Realtime event bus ───────────────────────────────────────────
    let event_bus = Arc::new(EventBus::new());
    tracing::info!("event bus ready");

    // ── Schedule store ───────────────────────────────────────────────
    let scheduler = Arc::new(
        ScheduleStore::load(&config.containers.data_root).context("loading schedule store")?,
    );
    tracing::info!("schedule store ready");

    // ── Per-session concurrency + cancellation ───────────────────────
    let session_locks = Arc::new(SessionLockMap::new());
    let cancel_map = Arc::new(CancelMap::new());
    tracing::info!("session lock map + cancel map ready");

    // ── Shutdown coordinator ─────────────────────────────────────────
    let shutdown = Arc::new(ShutdownCoordinator::new(containers.clone()));

    let state = AppState {
        config: config.clone(),
        config_path,
        containers,
        sessions,
        event_bus,
        scheduler: scheduler.clone(),
        session_locks,
        cancel_map,
        shutdown: shutdown.clone(),
        pumps: Arc::new(Mutex::new(HashSet::new())),
    };

    // ── Scheduler tick loop ───────────────────────────────────────────
    {
        let dispatcher: Arc<dyn TaskDispatcher> = Arc::new(GatewayDispatcher(state.clone()));
        let runner = SchedulerRunner::new(scheduler, dispatcher, config.scheduler.tick_secs);
        tokio::spawn(async move { runner.run().await });
    }
    tracing::info!(tick_secs = config.scheduler.tick_secs, "scheduler tick loop started");

    // ── Shutdown signal ───────────────────────────────────────────────
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_signal().await });
    }

    // ── CORS layer ────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    let app = api::router().with_state(state).layer(cors_layer);

    // ── Bind ──────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "superagent listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`), expanded into a predicate matching any
/// port on that host. A literal `"*"` allows all origins.
fn build_cors_layer(cors: &sa_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
