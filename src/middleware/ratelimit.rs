//! HTTP-layer glue for the fixed-window rate limiter:
//! derives the client key, checks it against `AppState::rate_limiter`, and
//! sets the `X-RateLimit-*` / `Retry-After` headers on every response.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::middleware::auth::OptionalAuth;
use crate::ratelimit::client_key;
use crate::AppState;

fn header_str(req_headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    req_headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    OptionalAuth(identity): OptionalAuth,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (user_id, api_key) = match &identity {
        Some(crate::middleware::auth::Identity::User(claims)) => (Some(claims.user_id.as_str()), None),
        Some(crate::middleware::auth::Identity::ApiKey(key)) => (None, Some(key.as_str())),
        None => (None, None),
    };

    let forwarded_for = header_str(req.headers(), "x-forwarded-for");
    let real_ip = header_str(req.headers(), "x-real-ip");
    let peer_ip = peer.ip().to_string();

    let key = client_key(
        user_id,
        api_key,
        forwarded_for.as_deref(),
        real_ip.as_deref(),
        Some(peer_ip.as_str()),
    );

    let decision = state.rate_limiter.check(&key).await;

    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.reset_after.as_secs().max(1),
            limit: decision.limit,
            remaining: decision.remaining,
        });
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from_str(&decision.limit.to_string()).unwrap(),
    );
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from_str(&decision.remaining.to_string()).unwrap(),
    );
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from_str(&decision.reset_after.as_secs().to_string()).unwrap(),
    );
    Ok(response)
}
