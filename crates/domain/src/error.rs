/// Shared error type used across all superagent crates.
///
/// Variants map 1:1 onto the error kinds named in the design doc; the
/// comment on each names the policy the caller is expected to apply.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),

    /// Container runtime CLI transient failure (stop on an already-gone
    /// container, a transient inspect race). Callers should log and continue.
    #[error("transient runtime error: {0}")]
    TransientRuntime(String),

    /// The configured container runtime is missing or not responding.
    /// Callers refuse container-dependent operations and surface
    /// `RUNTIME_UNAVAILABLE` readiness to clients.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// A container start attempt completed abnormally or never reached
    /// a healthy state. Not retried automatically.
    #[error("container start failed for agent {agent_slug}: {message}")]
    ContainerStartFailed { agent_slug: String, message: String },

    /// `getInfo` returned `stopped` while active sessions existed for
    /// the agent. Affected sessions must be marked errored.
    #[error("container crashed for agent {agent_slug}")]
    ContainerCrashed { agent_slug: String },

    /// The addressed session does not exist on disk or in the container.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A second user message arrived while the session was already active.
    #[error("session already active: {0}")]
    SessionAlreadyActive(String),

    /// An unparseable stream frame, or one missing a required field.
    #[error("malformed stream event: {0}")]
    MalformedStreamEvent(String),

    /// A JSONL append failed. The in-memory event is still broadcast;
    /// the loss is only visible to a client that refetches after reconnect.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// An `at`/`cron` expression failed to parse at schedule-create time.
    #[error("schedule parse error: {0}")]
    ScheduleParseError(String),

    /// An exception occurred while firing a scheduled task.
    #[error("schedule fire error for task {task_id}: {message}")]
    ScheduleFireError { task_id: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Best-effort classification used by HTTP adapters to pick a status
    /// code without the adapter needing to match every variant itself.
    pub fn status_hint(&self) -> u16 {
        match self {
            Error::SessionNotFound(_) => 404,
            Error::SessionAlreadyActive(_) => 409,
            Error::ScheduleParseError(_) => 400,
            Error::RuntimeUnavailable(_) => 503,
            Error::ContainerStartFailed { .. } | Error::ContainerCrashed { .. } => 502,
            Error::Config(_) => 400,
            _ => 500,
        }
    }
}
