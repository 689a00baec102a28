pub mod at_parser;
pub mod cron;
pub mod model;
pub mod runner;
pub mod store;

pub use at_parser::parse_at_expression;
pub use cron::{cron_matches, cron_next, cron_next_n, cron_next_tz, parse_tz};
pub use model::{ScheduleType, ScheduledTask, TaskStatus};
pub use runner::{SchedulerRunner, TaskDispatcher};
pub use store::ScheduleStore;
