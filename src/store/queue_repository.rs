//! Repository for the persistent retry queue.
//!
//! Claiming uses an atomic single-statement `UPDATE ... WHERE id = (SELECT
//! id ... LIMIT 1) RETURNING ...`, avoiding a long-lived transaction and
//! reducing contention on SQLite.

use chrono::{NaiveDateTime, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::QueuedJob;
use crate::error::{AppError, AppResult};

pub struct QueueRepository;

pub struct NewQueuedJob {
    pub request_json: String,
    pub destinations_json: String,
    pub priority: i64,
    pub max_attempts: i64,
    pub base_retry_delay_seconds: i64,
}

impl QueueRepository {
    pub async fn enqueue(pool: &SqlitePool, job: NewQueuedJob) -> AppResult<QueuedJob> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, QueuedJob>(
            r#"
            INSERT INTO queued_jobs (
                request_json, destinations_json, priority, attempts,
                max_attempts, base_retry_delay_seconds, next_attempt_at,
                status, worker_token, claimed_at, last_error, created_at, completed_at
            ) VALUES (?, ?, ?, 0, ?, ?, ?, 'pending', NULL, NULL, NULL, ?, NULL)
            RETURNING *
            "#,
        )
        .bind(&job.request_json)
        .bind(&job.destinations_json)
        .bind(job.priority)
        .bind(job.max_attempts)
        .bind(job.base_retry_delay_seconds)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Claim up to `batch_size` Pending entries due now, ordered by priority
    /// DESC then id ASC. Each is claimed with its own atomic statement
    /// rather than a single multi-row UPDATE, so a worker that dies mid-loop
    /// leaves already-claimed rows claimed (not rolled back).
    pub async fn claim_due(pool: &SqlitePool, batch_size: i64, worker_token: &str) -> AppResult<Vec<QueuedJob>> {
        let mut claimed = Vec::new();
        if batch_size <= 0 {
            return Ok(claimed);
        }
        for _ in 0..batch_size {
            let now = Utc::now().naive_utc();
            let row = sqlx::query_as::<_, QueuedJob>(
                r#"
                UPDATE queued_jobs
                SET status = 'in_flight', worker_token = ?, claimed_at = ?
                WHERE id = (
                    SELECT id FROM queued_jobs
                    WHERE status = 'pending' AND next_attempt_at <= ?
                    ORDER BY priority DESC, id ASC
                    LIMIT 1
                )
                RETURNING *
                "#,
            )
            .bind(worker_token)
            .bind(now)
            .bind(now)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

            match row {
                Some(job) => claimed.push(job),
                None => break,
            }
        }
        Ok(claimed)
    }

    pub async fn complete_success(pool: &SqlitePool, id: i64) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query("UPDATE queued_jobs SET status = 'succeeded', completed_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// Increment attempts and compute the next retry time with exponential
    /// backoff (`base * 2^attempts`, capped at 1h) plus +-20% jitter, where
    /// `attempts` is the pre-increment count (so the first retry uses
    /// exponent 0, the second exponent 1, ...). If attempts reach
    /// max_attempts, dead-letters instead.
    pub async fn complete_failure_reenqueue(
        pool: &SqlitePool,
        job: &QueuedJob,
        last_error: &str,
    ) -> AppResult<()> {
        let next_attempts = job.attempts + 1;
        if next_attempts >= job.max_attempts {
            return Self::complete_dead_letter(pool, job.id, next_attempts, last_error).await;
        }

        let delay = backoff_delay(job.base_retry_delay_seconds, job.attempts);
        let next_attempt_at = Utc::now().naive_utc() + chrono::Duration::seconds(delay);

        sqlx::query(
            "UPDATE queued_jobs SET attempts = ?, status = 'pending', next_attempt_at = ?, last_error = ?, worker_token = NULL, claimed_at = NULL WHERE id = ?",
        )
        .bind(next_attempts)
        .bind(next_attempt_at)
        .bind(last_error)
        .bind(job.id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn complete_dead_letter(
        pool: &SqlitePool,
        id: i64,
        attempts: i64,
        last_error: &str,
    ) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "UPDATE queued_jobs SET status = 'dead_lettered', attempts = ?, last_error = ?, completed_at = ? WHERE id = ?",
        )
        .bind(attempts)
        .bind(last_error)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    /// Revert InFlight entries whose claim is older than `reclaim_window`
    /// back to Pending, recovering from a crashed worker.
    /// Workers are expected to heartbeat `claimed_at` more often than the
    /// window; any row still `in_flight` past it is assumed abandoned.
    pub async fn reclaim_stale(pool: &SqlitePool, reclaim_window: chrono::Duration) -> AppResult<u64> {
        let cutoff = Utc::now().naive_utc() - reclaim_window;
        let result = sqlx::query(
            r#"
            UPDATE queued_jobs
            SET status = 'pending', worker_token = NULL, claimed_at = NULL
            WHERE status = 'in_flight' AND claimed_at <= ?
            "#,
        )
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    /// Touch `claimed_at` to extend a worker's lease on an in-flight entry
    /// past the reclaim window while a slow delivery is still in progress.
    pub async fn heartbeat(pool: &SqlitePool, id: i64) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query("UPDATE queued_jobs SET claimed_at = ? WHERE id = ? AND status = 'in_flight'")
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> AppResult<QueuedJob> {
        sqlx::query_as::<_, QueuedJob>("SELECT * FROM queued_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound(format!("queued job {id}")))
    }

    pub async fn stats(pool: &SqlitePool) -> AppResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM queued_jobs GROUP BY status")
                .fetch_all(pool)
                .await
                .map_err(AppError::Database)?;
        Ok(rows)
    }
}

pub fn new_worker_token() -> String {
    Uuid::new_v4().to_string()
}

/// `base * 2^attempts`, capped at 1h, with +-20% jitter to avoid thundering
/// herds.
fn backoff_delay(base_retry_delay_seconds: i64, attempts: i64) -> i64 {
    const MAX_DELAY_SECONDS: i64 = 3600;
    let exponent = attempts.min(20) as u32;
    let raw = base_retry_delay_seconds.saturating_mul(2i64.saturating_pow(exponent));
    let capped = raw.min(MAX_DELAY_SECONDS).max(1);
    let jitter_fraction = rand::thread_rng().gen_range(-0.2..=0.2);
    let jittered = (capped as f64) * (1.0 + jitter_fraction);
    jittered.round().max(1.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_within_jitter_band() {
        for attempts in 0..5 {
            let delay = backoff_delay(1, attempts);
            let expected = (2i64.pow(attempts as u32)).min(3600);
            let lower = (expected as f64 * 0.79).floor() as i64;
            let upper = (expected as f64 * 1.21).ceil() as i64;
            assert!(
                delay >= lower && delay <= upper,
                "attempts={attempts} delay={delay} expected~{expected}"
            );
        }
    }

    #[test]
    fn backoff_is_capped_at_one_hour() {
        let delay = backoff_delay(1, 30);
        assert!(delay <= (3600.0 * 1.2) as i64);
    }
}
