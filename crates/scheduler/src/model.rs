//! The `ScheduledTask` record and its lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    At,
    Cron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Executed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: String,
    pub agent_slug: String,
    pub schedule_type: ScheduleType,
    pub schedule_expression: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: TaskStatus,
    pub next_execution_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    pub fn new(
        agent_slug: String,
        schedule_type: ScheduleType,
        schedule_expression: String,
        prompt: String,
        next_execution_at: DateTime<Utc>,
        created_by_session_id: Option<String>,
    ) -> Self {
        let is_recurring = schedule_type == ScheduleType::Cron;
        ScheduledTask {
            id: uuid::Uuid::new_v4().to_string(),
            agent_slug,
            schedule_type,
            schedule_expression,
            prompt,
            name: None,
            status: TaskStatus::Pending,
            next_execution_at,
            last_executed_at: None,
            is_recurring,
            execution_count: 0,
            last_session_id: None,
            created_by_session_id,
            created_at: Utc::now(),
            cancelled_at: None,
        }
    }
}
