//! Bearer-JWT / API-key authentication for the control plane.
//!
//! Accepts two credential shapes: a signed compact token carrying
//! `{user_id, username, roles, exp, iat, nbf, sub, iss}`, or an opaque API
//! key prefixed with a configured literal.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub exp: usize,
    pub iat: usize,
    pub nbf: usize,
    pub sub: String,
    pub iss: String,
}

/// The authenticated caller, however their credential was presented.
#[derive(Debug, Clone)]
pub enum Identity {
    User(Claims),
    ApiKey(String),
}

impl Identity {
    /// The identifier used to key rate-limit buckets and log lines: the
    /// JWT's `user_id` if present, else the raw API key.
    pub fn client_id(&self) -> &str {
        match self {
            Identity::User(claims) => &claims.user_id,
            Identity::ApiKey(key) => key,
        }
    }
}

pub fn issue_token(config: &crate::config::AuthConfig, user_id: &str, username: &str, roles: Vec<String>) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = Claims {
        user_id: user_id.to_string(),
        username: username.to_string(),
        roles,
        iat: now.timestamp() as usize,
        nbf: now.timestamp() as usize,
        exp: (now + chrono::Duration::hours(24)).timestamp() as usize,
        sub: user_id.to_string(),
        iss: "notifyd".to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

fn decode_token(config: &crate::config::AuthConfig, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

fn parse_bearer(parts: &Parts, config: &crate::config::AuthConfig) -> Option<Identity> {
    let header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;
    let token = header.strip_prefix("Bearer ").or_else(|| header.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if token.starts_with(&config.api_key_prefix) {
        return Some(Identity::ApiKey(token.to_string()));
    }
    decode_token(config, token).map(Identity::User)
}

/// Required authentication: rejects with 401 if no valid credential is
/// presented. Used on every mutating control-plane endpoint.
pub struct RequireAuth(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        parse_bearer(parts, &state.config.auth)
            .map(RequireAuth)
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional authentication: never rejects. Used to derive the rate-limiter
/// client key, which falls back to IP when no credential is presented.
pub struct OptionalAuth(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(parse_bearer(parts, &state.config.auth)))
    }
}
