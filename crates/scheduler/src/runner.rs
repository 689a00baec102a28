//! The scheduler's tick loop: claim due tasks, dispatch each, record the
//! outcome, and — for recurring tasks — reschedule from `now` rather
//! than from the missed `next_execution_at`, so a scheduler outage never
//! backfires a burst of overdue cron fires. Catch-up is exactly one
//! fire, whenever the next tick happens to notice the task is overdue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use sa_domain::error::Result;

use crate::cron::{cron_next_tz, parse_tz};
use crate::model::{ScheduleType, ScheduledTask};
use crate::store::ScheduleStore;

/// Implemented by the gateway to actually run a task: start (or reuse)
/// the agent's container and send the task's prompt as a new message,
/// returning the session ID the fire landed in.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch(&self, task: &ScheduledTask) -> Result<String>;
}

pub struct SchedulerRunner {
    store: Arc<ScheduleStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    tick_interval: Duration,
}

impl SchedulerRunner {
    pub fn new(store: Arc<ScheduleStore>, dispatcher: Arc<dyn TaskDispatcher>, tick_secs: u64) -> Self {
        SchedulerRunner {
            store,
            dispatcher,
            tick_interval: Duration::from_secs(tick_secs),
        }
    }

    /// Runs forever. Intended to be spawned as one long-lived task on
    /// the process's `AppState`.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One tick: claim everything due and dispatch it. Exposed
    /// separately from `run` so tests can drive individual ticks.
    pub async fn tick(&self) {
        let due = self.store.claim_due(Utc::now());
        if due.is_empty() {
            return;
        }
        info!(count = due.len(), "dispatching due scheduled tasks");
        for task in due {
            self.fire(task).await;
        }
        if let Err(e) = self.store.flush() {
            warn!(error = %e, "failed to flush schedule store after tick");
        }
    }

    async fn fire(&self, task: ScheduledTask) {
        match self.dispatcher.dispatch(&task).await {
            Ok(session_id) => {
                let next = next_execution_for(&task);
                self.store.mark_executed(&task.id, &session_id, Utc::now(), next);
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "scheduled task dispatch failed");
                self.store.mark_failed(&task.id, &e.to_string());
            }
        }
    }
}

/// `None` finalizes a one-shot `at` task; `Some` reschedules a cron
/// task from the current moment, never from the missed slot.
fn next_execution_for(task: &ScheduledTask) -> Option<chrono::DateTime<Utc>> {
    if task.schedule_type != ScheduleType::Cron {
        return None;
    }
    let tz = parse_tz("UTC");
    cron_next_tz(&task.schedule_expression, &Utc::now(), tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScheduleType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDispatcher {
        count: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TaskDispatcher for CountingDispatcher {
        async fn dispatch(&self, _task: &ScheduledTask) -> Result<String> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(sa_domain::error::Error::Other("dispatch failed".into()))
            } else {
                Ok("session-1".into())
            }
        }
    }

    #[tokio::test]
    async fn tick_dispatches_and_finalizes_one_shot_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ScheduleStore::load(dir.path()).unwrap());
        let past = Utc::now() - chrono::Duration::minutes(1);
        let task = store.create(ScheduledTask::new(
            "agent1".into(),
            ScheduleType::At,
            "now + 1 minute".into(),
            "say hi".into(),
            past,
            None,
        ));
        let dispatcher = Arc::new(CountingDispatcher {
            count: AtomicUsize::new(0),
            fail: false,
        });
        let runner = SchedulerRunner::new(store.clone(), dispatcher.clone(), 30);
        runner.tick().await;

        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 1);
        let reloaded = store.get(&task.id).unwrap();
        assert_eq!(reloaded.status, crate::model::TaskStatus::Executed);
    }

    #[tokio::test]
    async fn failed_dispatch_marks_task_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ScheduleStore::load(dir.path()).unwrap());
        let past = Utc::now() - chrono::Duration::minutes(1);
        let task = store.create(ScheduledTask::new(
            "agent1".into(),
            ScheduleType::At,
            "now + 1 minute".into(),
            "say hi".into(),
            past,
            None,
        ));
        let dispatcher = Arc::new(CountingDispatcher {
            count: AtomicUsize::new(0),
            fail: true,
        });
        let runner = SchedulerRunner::new(store.clone(), dispatcher, 30);
        runner.tick().await;

        let reloaded = store.get(&task.id).unwrap();
        assert_eq!(reloaded.status, crate::model::TaskStatus::Failed);
    }

    #[tokio::test]
    async fn overdue_cron_task_fires_once_and_reschedules_forward() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ScheduleStore::load(dir.path()).unwrap());
        let long_overdue = Utc::now() - chrono::Duration::days(10);
        let task = store.create(ScheduledTask::new(
            "agent1".into(),
            ScheduleType::Cron,
            "0 9 * * *".into(),
            "daily digest".into(),
            long_overdue,
            None,
        ));
        let dispatcher = Arc::new(CountingDispatcher {
            count: AtomicUsize::new(0),
            fail: false,
        });
        let runner = SchedulerRunner::new(store.clone(), dispatcher.clone(), 30);
        runner.tick().await;

        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 1);
        let reloaded = store.get(&task.id).unwrap();
        assert_eq!(reloaded.status, crate::model::TaskStatus::Pending);
        assert!(reloaded.next_execution_at > Utc::now());
    }
}
