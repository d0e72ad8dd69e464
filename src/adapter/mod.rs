//! The adapter contract every protocol driver satisfies, plus
//! the scheme registry (4.1) and the reference adapters.

pub mod discord;
pub mod registry;
pub mod smtp;
pub mod webhook;

/// An in-memory `Adapter` used by this crate's own tests and available to
/// embedders exercising `Dispatcher`/`Registry` in their own test suites
/// without performing real network I/O.
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::descriptor::ParsedDescriptor;
use crate::notification::NotificationRequest;

/// The error taxonomy carried on a `Response`. Deliberately
/// distinct from `error::AppError`: it never crosses the HTTP boundary
/// directly, only through response aggregation.
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    #[error("invalid descriptor")]
    InvalidDescriptor,
    #[error("invalid configuration")]
    InvalidConfig,
    #[error("invalid request")]
    InvalidRequest,
    #[error("authentication failed")]
    AuthFailure,
    #[error("permanent remote failure: {0}")]
    PermanentRemote(String),
    #[error("transient remote failure: {0}")]
    TransientRemote(String),
    #[error("timed out")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error("attachment error: {0}")]
    AttachmentError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// The Queue retries `TransientRemote`/`Timeout`, and
    /// dead-letters/does-not-retry everything else.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientRemote(_) | ErrorKind::Timeout)
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Descriptor(#[from] crate::descriptor::DescriptorError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Every protocol driver satisfies this capability set. Adapters are
/// stateless with respect to concurrency once parsed — the engine may call
/// `send` on the same instance from multiple tasks in parallel.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable short scheme name (used in responses, metrics, logs).
    fn identifier(&self) -> &'static str;

    /// Hint for descriptor parsing; purely informational.
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// 0 means unbounded.
    fn max_body_length(&self) -> usize {
        0
    }

    fn supports_attachments(&self) -> bool {
        false
    }

    /// Perform one delivery attempt. No internal retry — retries are the
    /// Queue's responsibility. Must honor `timeout` for cancellation.
    async fn send(
        &self,
        request: &NotificationRequest,
        timeout: Duration,
    ) -> Result<(), ErrorKind>;
}

/// A factory builds a fresh, parsed adapter instance from a descriptor.
pub trait AdapterFactory: Send + Sync {
    fn parse(&self, parsed: &ParsedDescriptor) -> Result<Box<dyn Adapter>, ParseError>;
}

impl<F> AdapterFactory for F
where
    F: Fn(&ParsedDescriptor) -> Result<Box<dyn Adapter>, ParseError> + Send + Sync,
{
    fn parse(&self, parsed: &ParsedDescriptor) -> Result<Box<dyn Adapter>, ParseError> {
        (self)(parsed)
    }
}
