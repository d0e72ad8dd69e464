//! `GET /metrics` — lists the persisted per-adapter notification counters
//! (§4.6's `NotificationMetric` rows).

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::error::{ok_envelope, AppResult};
use crate::middleware::auth::RequireAuth;
use crate::store::metrics_repository::MetricsRepository;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(list_metrics))
}

async fn list_metrics(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
) -> AppResult<Json<serde_json::Value>> {
    let metrics = MetricsRepository::list_all(&state.pool).await?;
    Ok(ok_envelope("notification metrics", metrics))
}
