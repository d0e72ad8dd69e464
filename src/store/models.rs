//! Row types for the persistent store.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
    DeadLettered,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::InFlight => "in_flight",
            QueueStatus::Succeeded => "succeeded",
            QueueStatus::Failed => "failed",
            QueueStatus::DeadLettered => "dead_lettered",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "in_flight" => Some(QueueStatus::InFlight),
            "succeeded" => Some(QueueStatus::Succeeded),
            "failed" => Some(QueueStatus::Failed),
            "dead_lettered" => Some(QueueStatus::DeadLettered),
            _ => None,
        }
    }

    /// Terminal statuses never revert.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueueStatus::Succeeded | QueueStatus::Failed | QueueStatus::DeadLettered
        )
    }
}

/// A recurring notification rule driven by a cron expression.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: i64,
    pub name: String,
    pub cron_expression: String,
    pub next_fire_at: Option<NaiveDateTime>,
    pub last_fire_at: Option<NaiveDateTime>,
    pub enabled: bool,
    /// Serialized `NotificationRequest` template (title/severity/format/tags/url).
    pub request_template_json: String,
    /// Serialized `Vec<String>` of destination descriptors.
    pub destinations_json: String,
    pub body_template: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A single pending (or terminal) delivery with retry state.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: i64,
    pub request_json: String,
    pub destinations_json: String,
    pub priority: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub base_retry_delay_seconds: i64,
    pub next_attempt_at: NaiveDateTime,
    pub status: String,
    pub worker_token: Option<String>,
    /// Heartbeat timestamp set on claim; `reclaim_stale` compares this
    /// against the reclaim window, not `next_attempt_at`.
    pub claimed_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

impl QueuedJob {
    pub fn status(&self) -> QueueStatus {
        QueueStatus::from_str(&self.status).unwrap_or(QueueStatus::Pending)
    }
}

/// One completed dispatch attempt recorded for `GET /history`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryHistoryEntry {
    pub id: i64,
    pub queued_job_id: Option<i64>,
    pub adapter_identifier: String,
    pub success: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub elapsed_ms: i64,
    pub created_at: NaiveDateTime,
}

/// A coarse counter row (e.g. total notifications sent/failed by adapter).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationMetric {
    pub metric_key: String,
    pub count: i64,
    pub updated_at: NaiveDateTime,
}
