//! Repository for the delivery-history table backing `GET /history`
//!.

use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use super::models::DeliveryHistoryEntry;
use crate::dispatch::Response;
use crate::error::{AppError, AppResult};

pub struct HistoryRepository;

impl HistoryRepository {
    pub async fn append(pool: &SqlitePool, queued_job_id: Option<i64>, response: &Response) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_history (
                queued_job_id, adapter_identifier, success, error_kind,
                error_message, elapsed_ms, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(queued_job_id)
        .bind(response.adapter_identifier)
        .bind(response.success)
        .bind(response.error_kind.as_ref().map(|k| error_kind_label(k)))
        .bind(&response.error_message)
        .bind(response.elapsed.as_millis() as i64)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn query_by_time_range(
        pool: &SqlitePool,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: i64,
    ) -> AppResult<Vec<DeliveryHistoryEntry>> {
        sqlx::query_as::<_, DeliveryHistoryEntry>(
            r#"
            SELECT * FROM delivery_history
            WHERE created_at >= ? AND created_at <= ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}

fn error_kind_label(kind: &crate::adapter::ErrorKind) -> &'static str {
    use crate::adapter::ErrorKind::*;
    match kind {
        InvalidDescriptor => "invalid_descriptor",
        InvalidConfig => "invalid_config",
        InvalidRequest => "invalid_request",
        AuthFailure => "auth_failure",
        PermanentRemote(_) => "permanent_remote",
        TransientRemote(_) => "transient_remote",
        Timeout => "timeout",
        Cancelled => "cancelled",
        AttachmentError(_) => "attachment_error",
        Internal(_) => "internal",
    }
}
