//! `GET /history` — query-by-time-range over delivery history.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{ok_envelope, AppError, AppResult};
use crate::middleware::auth::RequireAuth;
use crate::store::history_repository::HistoryRepository;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/history", get(query_history))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<chrono::NaiveDateTime>,
    pub to: Option<chrono::NaiveDateTime>,
    pub limit: Option<i64>,
}

async fn query_history(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let to = query.to.unwrap_or_else(|| chrono::Utc::now().naive_utc());
    let from = query
        .from
        .unwrap_or_else(|| to - chrono::Duration::days(7));
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);

    if from > to {
        return Err(AppError::BadRequest("from must not be after to".into()));
    }

    let entries = HistoryRepository::query_by_time_range(&state.pool, from, to, limit).await?;
    Ok(ok_envelope("delivery history", entries))
}
