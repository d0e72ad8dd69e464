//! Repository for the coarse notification-metric counters (§4.6): one row
//! per metric key, incremented on every delivery outcome.

use chrono::Utc;
use sqlx::SqlitePool;

use super::models::NotificationMetric;
use crate::error::{AppError, AppResult};

pub struct MetricsRepository;

impl MetricsRepository {
    /// Upsert-increment: creates the row at count 1 if absent, otherwise
    /// bumps it by one and touches `updated_at`.
    pub async fn increment(pool: &SqlitePool, metric_key: &str) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO notification_metrics (metric_key, count, updated_at)
            VALUES (?, 1, ?)
            ON CONFLICT(metric_key) DO UPDATE SET count = count + 1, updated_at = excluded.updated_at
            "#,
        )
        .bind(metric_key)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<NotificationMetric>> {
        sqlx::query_as::<_, NotificationMetric>(
            "SELECT * FROM notification_metrics ORDER BY metric_key ASC",
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}

/// The metric key for one adapter's outcome: `"<adapter>.sent"` or
/// `"<adapter>.failed"`.
pub fn outcome_key(adapter_identifier: &str, success: bool) -> String {
    format!("{adapter_identifier}.{}", if success { "sent" } else { "failed" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn increment_creates_then_bumps_the_counter() {
        let pool = test_pool().await;
        MetricsRepository::increment(&pool, "webhook.sent").await.unwrap();
        MetricsRepository::increment(&pool, "webhook.sent").await.unwrap();
        MetricsRepository::increment(&pool, "webhook.failed").await.unwrap();

        let metrics = MetricsRepository::list_all(&pool).await.unwrap();
        let sent = metrics.iter().find(|m| m.metric_key == "webhook.sent").unwrap();
        let failed = metrics.iter().find(|m| m.metric_key == "webhook.failed").unwrap();
        assert_eq!(sent.count, 2);
        assert_eq!(failed.count, 1);
    }

    #[test]
    fn outcome_key_distinguishes_success_and_failure() {
        assert_eq!(outcome_key("webhook", true), "webhook.sent");
        assert_eq!(outcome_key("webhook", false), "webhook.failed");
    }
}
