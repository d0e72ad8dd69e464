use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Control-plane error type. Every HTTP handler returns `AppResult<T>` and
/// relies on `IntoResponse` below to produce the standard JSON envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimited {
        retry_after_secs: u64,
        limit: u32,
        remaining: u32,
    },

    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct Envelope {
    success: bool,
    message: String,
    data: Option<serde_json::Value>,
    error: Option<String>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, String) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AppError::SchedulerUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "a database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "an internal error occurred".to_string(),
                )
            }
        };

        let mut response = (
            status,
            Json(Envelope {
                success: false,
                message: message.clone(),
                data: None,
                error: Some(message),
                timestamp: chrono::Utc::now(),
            }),
        )
            .into_response();

        if let AppError::RateLimited {
            retry_after_secs,
            limit,
            remaining,
        } = &self
        {
            let headers = response.headers_mut();
            if let Ok(value) = retry_after_secs.to_string().parse() {
                headers.insert("Retry-After", value);
            }
            if let Ok(value) = limit.to_string().parse() {
                headers.insert("X-RateLimit-Limit", value);
            }
            if let Ok(value) = remaining.to_string().parse() {
                headers.insert("X-RateLimit-Remaining", value);
            }
            if let Ok(value) = retry_after_secs.to_string().parse() {
                headers.insert("X-RateLimit-Reset", value);
            }
        }

        response
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Wraps a successful payload in the same envelope shape used for errors,
/// per the control-plane's "JSON envelope on every response" requirement.
pub fn ok_envelope<T: Serialize>(message: &str, data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": message,
        "data": data,
        "error": serde_json::Value::Null,
        "timestamp": chrono::Utc::now(),
    }))
}
