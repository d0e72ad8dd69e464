//! Control-plane HTTP routes. Each module owns one resource
//! group and exposes a `router()` returning `Router<Arc<AppState>>`, merged
//! together in `main`.

pub mod health;
pub mod history;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod scheduler;
pub mod services;

use std::sync::Arc;

use axum::Router;

use crate::AppState;

/// Merge every resource group's router into one. `/health` and `/version`
/// are mounted separately by the caller so they can sit outside the
/// rate-limit/auth middleware stack.
pub fn protected_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(notify::router())
        .merge(services::router())
        .merge(scheduler::router())
        .merge(queue::router())
        .merge(history::router())
        .merge(metrics::router())
}
