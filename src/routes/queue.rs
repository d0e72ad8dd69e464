//! `POST /queue` and `GET /queue/stats` — ad hoc enqueueing and queue depth
//! reporting over the persistent retry queue.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{ok_envelope, AppError, AppResult};
use crate::middleware::auth::RequireAuth;
use crate::notification::NotificationRequest;
use crate::store::queue_repository::{NewQueuedJob, QueueRepository};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/queue", post(enqueue))
        .route("/queue/stats", get(stats))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueBody {
    pub request: NotificationRequest,
    pub destinations: Vec<String>,
    #[serde(default)]
    pub priority: i64,
    pub max_attempts: Option<u32>,
    pub base_retry_delay_seconds: Option<u64>,
}

async fn enqueue(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Json(body): Json<EnqueueBody>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if !body.request.is_valid() {
        return Err(AppError::BadRequest("notification body must not be empty".into()));
    }
    if body.destinations.is_empty() {
        return Err(AppError::BadRequest("destinations must not be empty".into()));
    }

    let request_json =
        serde_json::to_string(&body.request).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    let destinations_json =
        serde_json::to_string(&body.destinations).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

    let job = QueueRepository::enqueue(
        &state.pool,
        NewQueuedJob {
            request_json,
            destinations_json,
            priority: body.priority,
            max_attempts: body
                .max_attempts
                .unwrap_or(state.config.queue.default_max_attempts) as i64,
            base_retry_delay_seconds: body
                .base_retry_delay_seconds
                .unwrap_or(state.config.queue.base_retry_delay_seconds) as i64,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, ok_envelope("queued", job)))
}

async fn stats(State(state): State<Arc<AppState>>, _auth: RequireAuth) -> AppResult<Json<serde_json::Value>> {
    let rows = QueueRepository::stats(&state.pool).await?;
    let by_status: std::collections::HashMap<String, i64> = rows.into_iter().collect();
    Ok(ok_envelope("queue stats", by_status))
}
