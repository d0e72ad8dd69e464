//! `GET /services` — lists the live scheme registry, reflecting exactly
//! what's registered rather than a hardcoded table.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::adapter::registry::SchemeInfo;
use crate::middleware::auth::RequireAuth;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/services", get(list_services))
}

#[derive(Serialize)]
struct ServiceEntry {
    scheme: String,
    identifier: &'static str,
    default_port: Option<u16>,
    supports_attachments: bool,
    max_body_length: usize,
}

impl From<SchemeInfo> for ServiceEntry {
    fn from(info: SchemeInfo) -> Self {
        Self {
            scheme: info.scheme,
            identifier: info.identifier,
            default_port: info.default_port,
            supports_attachments: info.supports_attachments,
            max_body_length: info.max_body_length,
        }
    }
}

async fn list_services(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
) -> Json<serde_json::Value> {
    let services: Vec<ServiceEntry> = state
        .registry
        .list_services()
        .into_iter()
        .map(ServiceEntry::from)
        .collect();
    crate::error::ok_envelope("registered schemes", services)
}
