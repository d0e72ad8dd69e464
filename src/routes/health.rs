//! `GET /health` and `GET /version` — public endpoints exempt from auth and
//! rate limiting.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::store::metadata_repository::MetadataRepository;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
    })
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
    schema_version: String,
    schemes: Vec<String>,
}

/// Reports the crate version, the persisted store's schema version, and the
/// live registry's scheme list.
async fn version(State(state): State<Arc<AppState>>) -> Json<VersionResponse> {
    let schema_version = MetadataRepository::schema_version(&state.pool)
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        schema_version,
        schemes: state.registry.schemes(),
    })
}
