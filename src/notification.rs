//! Core data model: the unit of work dispatched to destinations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Coarse classification influencing adapter-specific formatting (color,
/// emoji, priority number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Text,
    Html,
    Markdown,
}

impl Default for BodyFormat {
    fn default() -> Self {
        BodyFormat::Text
    }
}

/// The unit of work fanned out to destinations by the dispatch engine.
/// Immutable once constructed — nothing downstream of `Dispatcher::notify`
/// is allowed to mutate it, only borrow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    #[serde(default)]
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub format: BodyFormat,
    #[serde(default)]
    pub tags: HashSet<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub attachments: Vec<crate::attachment::Attachment>,
}

impl NotificationRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            body: body.into(),
            severity: Severity::Info,
            format: BodyFormat::Text,
            tags: HashSet::new(),
            url: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Basic shape validation: an empty body is the only request-level
    /// constraint that's checked before fan-out.
    pub fn is_valid(&self) -> bool {
        !self.body.is_empty()
    }

    /// Truncate the body to at most `max_len` bytes... but at a Unicode
    /// character boundary, never splitting a multi-byte sequence, then
    /// append an ellipsis marker. `max_len` of 0 means unbounded (no-op).
    pub fn body_for_adapter(&self, max_len: usize) -> String {
        const ELLIPSIS: &str = "…";
        if max_len == 0 || self.body.chars().count() <= max_len {
            return self.body.clone();
        }
        let truncated: String = self.body.chars().take(max_len).collect();
        format!("{truncated}{ELLIPSIS}")
    }
}
