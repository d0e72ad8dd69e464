//! `POST /notify` and `POST /notify/bulk` — the control plane's entry point
//! into the dispatch engine.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::dispatch::{any_succeeded, Dispatcher, NotifyOptions, Response as DispatchResponse};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::RequireAuth;
use crate::notification::{BodyFormat, NotificationRequest, Severity};
use crate::store::metrics_repository::{outcome_key, MetricsRepository};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notify", post(notify))
        .route("/notify/bulk", post(notify_bulk))
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyRequestBody {
    /// Destination descriptors to resolve ad hoc. If empty, the engine's
    /// pre-registered destinations (optionally filtered by `tags`) are used
    /// instead.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub title: String,
    pub body: String,
    #[serde(default, rename = "type")]
    pub severity: Severity,
    #[serde(default)]
    pub format: BodyFormat,
    #[serde(default)]
    pub tags: HashSet<String>,
}

#[derive(Debug, Serialize)]
pub struct DestinationResult {
    pub adapter: &'static str,
    pub success: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub elapsed_ms: u128,
}

impl From<&DispatchResponse> for DestinationResult {
    fn from(r: &DispatchResponse) -> Self {
        Self {
            adapter: r.adapter_identifier,
            success: r.success,
            error_kind: r.error_kind.as_ref().map(|k| k.to_string()),
            error_message: r.error_message.clone(),
            elapsed_ms: r.elapsed.as_millis(),
        }
    }
}

fn request_from_body(body: NotifyRequestBody) -> NotificationRequest {
    NotificationRequest {
        title: body.title,
        body: body.body,
        severity: body.severity,
        format: body.format,
        tags: body.tags,
        url: None,
        attachments: Vec::new(),
    }
}

/// Resolve `urls` ad hoc through the registry into a throwaway dispatcher,
/// falling back to the engine's pre-registered destinations filtered by
/// `tags` when no explicit urls are given.
async fn dispatch_ad_hoc_or_registered(
    state: &AppState,
    urls: &[String],
    tags: &HashSet<String>,
    request: &NotificationRequest,
) -> Vec<DispatchResponse> {
    if urls.is_empty() {
        let options = NotifyOptions { tags: tags.clone() };
        return state.dispatcher.notify(request, &options).await;
    }

    let ad_hoc = Dispatcher::new(std::time::Duration::from_secs(
        state.config.dispatch.timeout_seconds,
    ));
    for url in urls {
        match state.registry.resolve(url) {
            Ok(adapter) => ad_hoc.add(adapter, []).await,
            Err(e) => tracing::warn!(url, error = ?e, "failed to resolve destination descriptor"),
        }
    }
    ad_hoc.notify(request, &NotifyOptions::default()).await
}

/// Bumps the per-adapter sent/failed counters for one dispatch's responses.
/// Best-effort: a metrics write failure never affects the HTTP response.
async fn record_metrics(state: &AppState, responses: &[DispatchResponse]) {
    for response in responses {
        let key = outcome_key(response.adapter_identifier, response.success);
        if let Err(e) = MetricsRepository::increment(&state.pool, &key).await {
            tracing::warn!(error = ?e, "failed to increment notification metric");
        }
    }
}

fn envelope_status(responses: &[DispatchResponse]) -> StatusCode {
    if responses.is_empty() || any_succeeded(responses) {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn notify(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Json(body): Json<NotifyRequestBody>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let request = request_from_body(body.clone());
    let responses = dispatch_ad_hoc_or_registered(&state, &body.urls, &body.tags, &request).await;
    record_metrics(&state, &responses).await;
    let status = envelope_status(&responses);
    let success = status == StatusCode::OK;

    let data: Vec<DestinationResult> = responses.iter().map(DestinationResult::from).collect();
    Ok((
        status,
        Json(serde_json::json!({
            "success": success,
            "message": if success { "dispatched" } else { "all destinations failed" },
            "data": data,
            "error": serde_json::Value::Null,
            "timestamp": chrono::Utc::now(),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct BulkNotifyRequestBody {
    pub notifications: Vec<NotifyRequestBody>,
}

async fn notify_bulk(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Json(body): Json<BulkNotifyRequestBody>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if body.notifications.is_empty() {
        return Err(AppError::BadRequest("notifications array must not be empty".into()));
    }

    let mut results = Vec::with_capacity(body.notifications.len());
    let mut all_failed = true;
    for item in &body.notifications {
        let request = request_from_body(item.clone());
        let responses = dispatch_ad_hoc_or_registered(&state, &item.urls, &item.tags, &request).await;
        record_metrics(&state, &responses).await;
        if any_succeeded(&responses) {
            all_failed = false;
        }
        results.push(
            responses
                .iter()
                .map(DestinationResult::from)
                .collect::<Vec<_>>(),
        );
    }

    let status = if all_failed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(serde_json::json!({
            "success": !all_failed,
            "message": "bulk dispatch complete",
            "data": results,
            "error": serde_json::Value::Null,
            "timestamp": chrono::Utc::now(),
        })),
    ))
}
