//! Discord chat-webhook adapter: posts an embed to a Discord incoming
//! webhook URL. Webhook-only surface (no bot token, no OAuth, no
//! guild/channel management).

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{Adapter, AdapterFactory, ErrorKind, ParseError};
use crate::descriptor::ParsedDescriptor;
use crate::notification::{NotificationRequest, Severity};

#[derive(Debug, Clone, Serialize)]
struct DiscordEmbed {
    title: Option<String>,
    description: String,
    url: Option<String>,
    color: u32,
}

#[derive(Debug, Clone, Serialize)]
struct WebhookMessage {
    embeds: Vec<DiscordEmbed>,
}

fn color_for(severity: Severity) -> u32 {
    match severity {
        Severity::Info => 0x3498db,
        Severity::Success => 0x2ecc71,
        Severity::Warning => 0xf1c40f,
        Severity::Error => 0xe74c3c,
    }
}

pub struct DiscordAdapter {
    client: reqwest::Client,
    webhook_url: String,
}

/// Builds a `DiscordAdapter` from a `discord://<webhook-id>/<webhook-token>`
/// descriptor, recomposed into `https://discord.com/api/webhooks/<id>/<token>`.
pub fn factory() -> impl AdapterFactory {
    |parsed: &ParsedDescriptor| -> Result<Box<dyn Adapter>, ParseError> {
        let id = parsed.host.clone().ok_or_else(|| {
            ParseError::InvalidConfig("discord descriptor has no webhook id".into())
        })?;
        let token = parsed.path_segments.first().cloned().ok_or_else(|| {
            ParseError::InvalidConfig("discord descriptor has no webhook token".into())
        })?;
        let webhook_url = format!("https://discord.com/api/webhooks/{id}/{token}");
        Ok(Box::new(DiscordAdapter {
            client: reqwest::Client::new(),
            webhook_url,
        }))
    }
}

#[async_trait]
impl Adapter for DiscordAdapter {
    fn identifier(&self) -> &'static str {
        "discord"
    }

    fn max_body_length(&self) -> usize {
        4096 // Discord embed description limit.
    }

    fn supports_attachments(&self) -> bool {
        false
    }

    async fn send(
        &self,
        request: &NotificationRequest,
        timeout: Duration,
    ) -> Result<(), ErrorKind> {
        let payload = WebhookMessage {
            embeds: vec![DiscordEmbed {
                title: if request.title.is_empty() {
                    None
                } else {
                    Some(request.title.clone())
                },
                description: request.body_for_adapter(self.max_body_length()),
                url: request.url.clone(),
                color: color_for(request.severity),
            }],
        };

        let send = self.client.post(&self.webhook_url).json(&payload).send();
        let response = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) if e.is_timeout() => return Err(ErrorKind::Timeout),
            Ok(Err(e)) => return Err(ErrorKind::TransientRemote(e.to_string())),
            Err(_) => return Err(ErrorKind::Timeout),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 401 || status.as_u16() == 404 {
            return Err(ErrorKind::AuthFailure);
        }
        if status.as_u16() == 429 {
            return Err(ErrorKind::TransientRemote("rate limited by Discord".into()));
        }
        if status.is_client_error() {
            return Err(ErrorKind::PermanentRemote(format!(
                "discord webhook returned {status}"
            )));
        }
        Err(ErrorKind::TransientRemote(format!(
            "discord webhook returned {status}"
        )))
    }
}
