//! Generic webhook adapter: POSTs the notification as JSON to an arbitrary
//! HTTPS endpoint. Registered under both `webhook://` and `webhooks://`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{Adapter, AdapterFactory, ErrorKind, ParseError};
use crate::descriptor::ParsedDescriptor;
use crate::notification::NotificationRequest;

const DEFAULT_MAX_BODY_LENGTH: usize = 0; // unbounded: the remote decides.

pub struct WebhookAdapter {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    body: String,
    severity: &'a str,
    format: &'static str,
    url: Option<&'a str>,
    tags: Vec<&'a str>,
}

impl WebhookAdapter {
    fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

/// Builds a `WebhookAdapter` from a `webhook://` / `webhooks://` descriptor.
/// The descriptor's host, port, and path are recombined into an https URL;
/// `?scheme=http` overrides to plaintext for local/testing targets.
pub fn factory() -> impl AdapterFactory {
    |parsed: &ParsedDescriptor| -> Result<Box<dyn Adapter>, ParseError> {
        let host = parsed
            .host
            .clone()
            .ok_or_else(|| ParseError::InvalidConfig("webhook descriptor has no host".into()))?;
        let transport = parsed.query_get("scheme").unwrap_or("https");
        let mut url = format!("{transport}://{host}");
        if let Some(port) = parsed.port {
            url.push_str(&format!(":{port}"));
        }
        let path = parsed.path();
        if !path.is_empty() {
            url.push('/');
            url.push_str(&path);
        }
        Ok(Box::new(WebhookAdapter::new(url)))
    }
}

#[async_trait]
impl Adapter for WebhookAdapter {
    fn identifier(&self) -> &'static str {
        "webhook"
    }

    fn max_body_length(&self) -> usize {
        DEFAULT_MAX_BODY_LENGTH
    }

    fn supports_attachments(&self) -> bool {
        false
    }

    async fn send(
        &self,
        request: &NotificationRequest,
        timeout: Duration,
    ) -> Result<(), ErrorKind> {
        let payload = WebhookPayload {
            title: &request.title,
            body: request.body_for_adapter(self.max_body_length()),
            severity: request.severity.as_str(),
            format: match request.format {
                crate::notification::BodyFormat::Text => "text",
                crate::notification::BodyFormat::Html => "html",
                crate::notification::BodyFormat::Markdown => "markdown",
            },
            url: request.url.as_deref(),
            tags: request.tags.iter().map(String::as_str).collect(),
        };

        let send = self.client.post(&self.url).json(&payload).send();
        let response = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(classify_reqwest_error(&e)),
            Err(_) => return Err(ErrorKind::Timeout),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ErrorKind::AuthFailure);
        }
        if status.is_client_error() {
            return Err(ErrorKind::PermanentRemote(format!(
                "webhook endpoint returned {status}"
            )));
        }
        Err(ErrorKind::TransientRemote(format!(
            "webhook endpoint returned {status}"
        )))
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::Timeout
    } else if e.is_connect() {
        ErrorKind::TransientRemote(e.to_string())
    } else {
        ErrorKind::TransientRemote(e.to_string())
    }
}
