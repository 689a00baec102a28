//! OS-signal dispatcher: SIGTERM/SIGINT (and SIGHUP on unix) trigger
//! exactly one shutdown sequence, however many signals arrive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::manager::ContainerManager;

pub struct ShutdownCoordinator {
    manager: Arc<ContainerManager>,
    triggered: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ContainerManager>) -> Self {
        ShutdownCoordinator {
            manager,
            triggered: AtomicBool::new(false),
        }
    }

    /// Stop all running containers. Idempotent: a second call after the
    /// first has completed is a no-op.
    pub async fn shutdown(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutdown requested, stopping all containers");
        self.manager.stop_all().await;
    }

    /// Registers handlers for SIGTERM/SIGINT (SIGHUP on unix) and
    /// returns once the first one fires and `shutdown` has completed.
    #[cfg(unix)]
    pub async fn wait_for_signal(self: Arc<Self>) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut hup = signal(SignalKind::hangup()).expect("install SIGHUP handler");

        tokio::select! {
            _ = term.recv() => info!("received SIGTERM"),
            _ = int.recv() => info!("received SIGINT"),
            _ = hup.recv() => info!("received SIGHUP"),
        }
        self.shutdown().await;
    }

    #[cfg(not(unix))]
    pub async fn wait_for_signal(self: Arc<Self>) {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
        self.shutdown().await;
    }
}
