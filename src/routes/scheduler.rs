//! `/scheduler/jobs` — CRUD plus enable/disable over `ScheduledJob`
//!.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ok_envelope, AppError, AppResult};
use crate::middleware::auth::RequireAuth;
use crate::notification::NotificationRequest;
use crate::scheduler::initial_next_fire;
use crate::store::models::ScheduledJob;
use crate::store::scheduled_job_repository::{NewScheduledJob, ScheduledJobRepository};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/scheduler/jobs", get(list_jobs).post(create_job))
        .route(
            "/scheduler/jobs/:id",
            get(get_job).put(update_job).delete(delete_job),
        )
        .route("/scheduler/jobs/:id/enable", post(enable_job))
        .route("/scheduler/jobs/:id/disable", post(disable_job))
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduledJobBody {
    pub name: String,
    pub cron_expression: String,
    pub request: NotificationRequest,
    pub destinations: Vec<String>,
    #[serde(default)]
    pub body_template: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduledJobBody {
    pub cron_expression: Option<String>,
    pub request: Option<NotificationRequest>,
    pub destinations: Option<Vec<String>>,
    pub body_template: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScheduledJobView {
    id: i64,
    name: String,
    cron_expression: String,
    next_fire_at: Option<chrono::NaiveDateTime>,
    last_fire_at: Option<chrono::NaiveDateTime>,
    enabled: bool,
}

impl From<ScheduledJob> for ScheduledJobView {
    fn from(job: ScheduledJob) -> Self {
        Self {
            id: job.id,
            name: job.name,
            cron_expression: job.cron_expression,
            next_fire_at: job.next_fire_at,
            last_fire_at: job.last_fire_at,
            enabled: job.enabled,
        }
    }
}

fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid job id {raw:?}")))
}

async fn list_jobs(State(state): State<Arc<AppState>>, _auth: RequireAuth) -> AppResult<Json<serde_json::Value>> {
    let jobs = ScheduledJobRepository::list_all(&state.pool).await?;
    let views: Vec<ScheduledJobView> = jobs.into_iter().map(ScheduledJobView::from).collect();
    Ok(ok_envelope("scheduled jobs", views))
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Json(body): Json<CreateScheduledJobBody>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let next_fire_at = initial_next_fire(&body.cron_expression)
        .map_err(|e| AppError::BadRequest(format!("invalid cron expression: {e}")))?;

    let request_template_json = serde_json::to_string(&body.request)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    let destinations_json = serde_json::to_string(&body.destinations)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

    let job = ScheduledJobRepository::insert(
        &state.pool,
        NewScheduledJob {
            name: body.name,
            cron_expression: body.cron_expression,
            next_fire_at: Some(next_fire_at),
            request_template_json,
            destinations_json,
            body_template: body.body_template,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        ok_envelope("scheduled job created", ScheduledJobView::from(job)),
    ))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let job = ScheduledJobRepository::get_by_id(&state.pool, id).await?;
    Ok(ok_envelope("scheduled job", ScheduledJobView::from(job)))
}

/// Changing the cron expression recomputes `next_fire_at` from the current
/// wall clock.
async fn update_job(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Path(id): Path<String>,
    Json(body): Json<UpdateScheduledJobBody>,
) -> AppResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let existing = ScheduledJobRepository::get_by_id(&state.pool, id).await?;

    let cron_expression = body.cron_expression.unwrap_or(existing.cron_expression);
    let request_template_json = match body.request {
        Some(r) => serde_json::to_string(&r).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?,
        None => existing.request_template_json,
    };
    let destinations_json = match body.destinations {
        Some(d) => serde_json::to_string(&d).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?,
        None => existing.destinations_json,
    };
    let body_template = body.body_template.or(existing.body_template);

    let next_fire_at = initial_next_fire(&cron_expression)
        .map_err(|e| AppError::BadRequest(format!("invalid cron expression: {e}")))?;

    sqlx::query(
        r#"
        UPDATE scheduled_jobs
        SET cron_expression = ?, request_template_json = ?, destinations_json = ?,
            body_template = ?, next_fire_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&cron_expression)
    .bind(&request_template_json)
    .bind(&destinations_json)
    .bind(&body_template)
    .bind(next_fire_at)
    .bind(chrono::Utc::now().naive_utc())
    .bind(id)
    .execute(&state.pool)
    .await
    .map_err(AppError::Database)?;

    let updated = ScheduledJobRepository::get_by_id(&state.pool, id).await?;
    Ok(ok_envelope("scheduled job updated", ScheduledJobView::from(updated)))
}

async fn delete_job(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    ScheduledJobRepository::delete(&state.pool, id).await?;
    Ok(ok_envelope("scheduled job deleted", serde_json::Value::Null))
}

async fn enable_job(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let job = ScheduledJobRepository::set_enabled(&state.pool, id, true).await?;
    Ok(ok_envelope("scheduled job enabled", ScheduledJobView::from(job)))
}

async fn disable_job(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let job = ScheduledJobRepository::set_enabled(&state.pool, id, false).await?;
    Ok(ok_envelope("scheduled job disabled", ScheduledJobView::from(job)))
}
