//! Repository for the cron-scheduled recurring job table.

use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;

use super::models::ScheduledJob;
use crate::error::{AppError, AppResult};

pub struct ScheduledJobRepository;

pub struct NewScheduledJob {
    pub name: String,
    pub cron_expression: String,
    pub next_fire_at: Option<NaiveDateTime>,
    pub request_template_json: String,
    pub destinations_json: String,
    pub body_template: Option<String>,
}

impl ScheduledJobRepository {
    pub async fn insert(pool: &SqlitePool, job: NewScheduledJob) -> AppResult<ScheduledJob> {
        let now = Utc::now().naive_utc();
        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM scheduled_jobs WHERE name = ?")
            .bind(&job.name)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;
        if existing > 0 {
            return Err(AppError::Conflict(format!(
                "scheduled job named {:?} already exists",
                job.name
            )));
        }

        sqlx::query_as::<_, ScheduledJob>(
            r#"
            INSERT INTO scheduled_jobs (
                name, cron_expression, next_fire_at, last_fire_at, enabled,
                request_template_json, destinations_json, body_template,
                created_at, updated_at
            ) VALUES (?, ?, ?, NULL, 1, ?, ?, ?, ?, ?)
            RETURNING
                id, name, cron_expression, next_fire_at, last_fire_at, enabled,
                request_template_json, destinations_json, body_template,
                created_at, updated_at
            "#,
        )
        .bind(&job.name)
        .bind(&job.cron_expression)
        .bind(job.next_fire_at)
        .bind(&job.request_template_json)
        .bind(&job.destinations_json)
        .bind(&job.body_template)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> AppResult<ScheduledJob> {
        sqlx::query_as::<_, ScheduledJob>("SELECT * FROM scheduled_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound(format!("scheduled job {id}")))
    }

    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<ScheduledJob>> {
        sqlx::query_as::<_, ScheduledJob>("SELECT * FROM scheduled_jobs ORDER BY id ASC")
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn list_enabled_due(pool: &SqlitePool, now: NaiveDateTime) -> AppResult<Vec<ScheduledJob>> {
        sqlx::query_as::<_, ScheduledJob>(
            "SELECT * FROM scheduled_jobs WHERE enabled = 1 AND next_fire_at <= ? ORDER BY next_fire_at ASC",
        )
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("scheduled job {id}")));
        }
        Ok(())
    }

    pub async fn set_enabled(pool: &SqlitePool, id: i64, enabled: bool) -> AppResult<ScheduledJob> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, ScheduledJob>(
            "UPDATE scheduled_jobs SET enabled = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(enabled)
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("scheduled job {id}")))
    }

    pub async fn set_next_fire(pool: &SqlitePool, id: i64, next_fire_at: NaiveDateTime) -> AppResult<ScheduledJob> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, ScheduledJob>(
            "UPDATE scheduled_jobs SET next_fire_at = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(next_fire_at)
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("scheduled job {id}")))
    }
}
