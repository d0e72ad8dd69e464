//! The scheduler loop: a single dedicated task that fires due cron jobs and
//! reclaims stale in-flight queue entries on a fixed tick.
//!
//! A `tokio::spawn` loop, `tokio::select!` against a shutdown broadcast,
//! `tokio::time::sleep` for the interval.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::cron::CronExpression;
use crate::error::AppResult;
use crate::notification::NotificationRequest;
use crate::store::models::ScheduledJob;
use crate::store::queue_repository::{NewQueuedJob, QueueRepository};
use crate::store::scheduled_job_repository::ScheduledJobRepository;

pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub reclaim_window: Duration,
    pub default_max_attempts: i64,
    pub base_retry_delay_seconds: i64,
}

/// Recompute `next_fire_at` from the current wall clock and atomically
/// advance the scheduled job + enqueue its fired `QueuedJob` in one
/// transaction, so a crash between the two can't skip or double-fire
///.
async fn fire_job(pool: &SqlitePool, job: &ScheduledJob, cfg: &SchedulerConfig) -> AppResult<()> {
    let expr = CronExpression::parse(&job.cron_expression)
        .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    let now = chrono::Utc::now().naive_utc();
    let last_fire_floor = job.last_fire_at.map(|last| last + chrono::Duration::seconds(1));
    let floor = match last_fire_floor {
        Some(floor) => floor.max(now),
        None => now,
    };
    let next_fire_at = expr
        .next_after(chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(
            floor,
            chrono::Utc,
        ))
        .naive_utc();

    let request: NotificationRequest = serde_json::from_str(&job.request_template_json)
        .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e)))?;
    let request_json = serde_json::to_string(&request)
        .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e)))?;

    let mut tx = pool.begin().await.map_err(crate::error::AppError::Database)?;

    sqlx::query(
        "UPDATE scheduled_jobs SET last_fire_at = ?, next_fire_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(next_fire_at)
    .bind(now)
    .bind(job.id)
    .execute(&mut *tx)
    .await
    .map_err(crate::error::AppError::Database)?;

    sqlx::query(
        r#"
        INSERT INTO queued_jobs (
            request_json, destinations_json, priority, attempts,
            max_attempts, base_retry_delay_seconds, next_attempt_at,
            status, worker_token, claimed_at, last_error, created_at, completed_at
        ) VALUES (?, ?, 0, 0, ?, ?, ?, 'pending', NULL, NULL, NULL, ?, NULL)
        "#,
    )
    .bind(&request_json)
    .bind(&job.destinations_json)
    .bind(cfg.default_max_attempts)
    .bind(cfg.base_retry_delay_seconds)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(crate::error::AppError::Database)?;

    tx.commit().await.map_err(crate::error::AppError::Database)?;

    tracing::info!(job_id = job.id, name = %job.name, next_fire_at = %next_fire_at, "fired scheduled job");
    Ok(())
}

/// One tick: fire every due, enabled scheduled job, then reclaim crashed
/// in-flight queue entries.
pub async fn tick(pool: &SqlitePool, cfg: &SchedulerConfig) {
    let now = chrono::Utc::now().naive_utc();
    match ScheduledJobRepository::list_enabled_due(pool, now).await {
        Ok(due) => {
            for job in due {
                if let Err(e) = fire_job(pool, &job, cfg).await {
                    tracing::error!(job_id = job.id, error = ?e, "failed to fire scheduled job");
                }
            }
        }
        Err(e) => tracing::error!(error = ?e, "failed to list due scheduled jobs"),
    }

    let reclaim_window = chrono::Duration::from_std(cfg.reclaim_window).unwrap_or(chrono::Duration::seconds(300));
    match QueueRepository::reclaim_stale(pool, reclaim_window).await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(count = n, "reclaimed stale in-flight queue entries"),
        Err(e) => tracing::error!(error = ?e, "failed to reclaim stale queue entries"),
    }
}

/// Spawn the scheduler loop as a background task. Single-writer by design:
/// running two instances against one store may double-fire —
/// callers are responsible for ensuring only one process runs this.
pub fn spawn(
    pool: SqlitePool,
    cfg: SchedulerConfig,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tick(&pool, &cfg).await;

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("scheduler loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(cfg.tick_interval) => {}
            }
        }
    })
}

/// Build a `NewScheduledJob`-equivalent insert helper used by the
/// scheduler HTTP routes: computes the initial `next_fire_at` from "now"
/// so the invariant `enabled => next_fire_at != null` holds immediately.
pub fn initial_next_fire(cron_expression: &str) -> Result<chrono::NaiveDateTime, crate::cron::CronError> {
    let expr = CronExpression::parse(cron_expression)?;
    Ok(expr.next_after(chrono::Utc::now()).naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::scheduled_job_repository::NewScheduledJob;
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
    async fn tick_fires_due_job_and_advances_next_fire() {
        let pool = test_pool().await;
        let request = NotificationRequest::new("scheduled body");
        let next_fire_at = initial_next_fire("*/5 * * * *").unwrap();

        let job = ScheduledJobRepository::insert(
            &pool,
            NewScheduledJob {
                name: "every-5-min".into(),
                cron_expression: "*/5 * * * *".into(),
                next_fire_at: Some(next_fire_at),
                request_template_json: serde_json::to_string(&request).unwrap(),
                destinations_json: serde_json::to_string(&Vec::<String>::new()).unwrap(),
                body_template: None,
            },
        )
        .await
        .unwrap();

        // Force it due immediately.
        let past = chrono::Utc::now().naive_utc() - chrono::Duration::minutes(1);
        ScheduledJobRepository::set_next_fire(&pool, job.id, past).await.unwrap();

        let cfg = SchedulerConfig {
            tick_interval: Duration::from_secs(10),
            reclaim_window: Duration::from_secs(300),
            default_max_attempts: 5,
            base_retry_delay_seconds: 1,
        };
        tick(&pool, &cfg).await;

        let refreshed = ScheduledJobRepository::get_by_id(&pool, job.id).await.unwrap();
        assert!(refreshed.next_fire_at.unwrap() > past);
        assert!(refreshed.last_fire_at.is_some());

        let stats = QueueRepository::stats(&pool).await.unwrap();
        assert_eq!(stats.iter().find(|(s, _)| s == "pending").map(|(_, c)| *c), Some(1));
    }

    #[tokio::test]
    async fn tick_reclaims_stale_in_flight_entries() {
        let pool = test_pool().await;
        let queued = QueueRepository::enqueue(
            &pool,
            NewQueuedJob {
                request_json: serde_json::to_string(&NotificationRequest::new("b")).unwrap(),
                destinations_json: serde_json::to_string(&Vec::<String>::new()).unwrap(),
                priority: 0,
                max_attempts: 5,
                base_retry_delay_seconds: 1,
            },
        )
        .await
        .unwrap();
        QueueRepository::claim_due(&pool, 1, "worker-1").await.unwrap();

        // Backdate the claim past the reclaim window.
        let stale = chrono::Utc::now().naive_utc() - chrono::Duration::seconds(600);
        sqlx::query("UPDATE queued_jobs SET claimed_at = ? WHERE id = ?")
            .bind(stale)
            .bind(queued.id)
            .execute(&pool)
            .await
            .unwrap();

        let cfg = SchedulerConfig {
            tick_interval: Duration::from_secs(10),
            reclaim_window: Duration::from_secs(300),
            default_max_attempts: 5,
            base_retry_delay_seconds: 1,
        };
        tick(&pool, &cfg).await;

        let refreshed = QueueRepository::get_by_id(&pool, queued.id).await.unwrap();
        assert_eq!(refreshed.status, "pending");
    }
}
