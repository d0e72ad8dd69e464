//! The dispatch engine: fan-out of one `NotificationRequest` to an ordered
//! set of destinations, with bounded lifetime, cancellation, and
//! order-preserving result aggregation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::debug;

use crate::adapter::{Adapter, ErrorKind};
use crate::notification::NotificationRequest;

/// One registered delivery target: an adapter instance, its tag set, and the
/// insertion index it was added at. Tag sets are immutable once registered.
pub struct Destination {
    pub adapter: Box<dyn Adapter>,
    pub tags: std::collections::HashSet<String>,
    pub index: usize,
}

/// Per-destination outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct Response {
    pub adapter_identifier: &'static str,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub elapsed: Duration,
}

impl Response {
    fn invalid_request() -> Self {
        Self {
            adapter_identifier: "",
            success: false,
            error_kind: Some(ErrorKind::InvalidRequest),
            error_message: Some("request body is empty".to_string()),
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifyOptions {
    /// If non-empty, only destinations whose tag set intersects this filter
    /// are selected. Empty means "all destinations".
    pub tags: std::collections::HashSet<String>,
}

/// Holds the ordered destination collection and drives fan-out. Owns no
/// adapter state beyond what destinations carry; multiple independent
/// instances may coexist in one process.
pub struct Dispatcher {
    destinations: RwLock<Vec<Destination>>,
    timeout: Duration,
    next_index: std::sync::atomic::AtomicUsize,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            destinations: RwLock::new(Vec::new()),
            timeout,
            next_index: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Register a destination, appending it at the next insertion index.
    pub async fn add(
        &self,
        adapter: Box<dyn Adapter>,
        tags: impl IntoIterator<Item = String>,
    ) {
        let index = self
            .next_index
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.destinations.write().await.push(Destination {
            adapter,
            tags: tags.into_iter().collect(),
            index,
        });
    }

    /// Deregister every destination.
    pub async fn clear(&self) {
        self.destinations.write().await.clear();
    }

    pub async fn destination_count(&self) -> usize {
        self.destinations.read().await.len()
    }

    /// Fan out `request` to the destinations matching `options.tags`
    /// (or all, if empty), returning one `Response` per selected destination
    /// in insertion order. Never returns an engine-level error; per-
    /// destination failures are carried in the responses themselves.
    pub async fn notify(&self, request: &NotificationRequest, options: &NotifyOptions) -> Vec<Response> {
        if !request.is_valid() {
            return vec![Response::invalid_request()];
        }

        let destinations = self.destinations.read().await;
        let selected: Vec<usize> = destinations
            .iter()
            .enumerate()
            .filter(|(_, dest)| {
                options.tags.is_empty() || !dest.tags.is_disjoint(&options.tags)
            })
            .map(|(i, _)| i)
            .collect();

        if selected.is_empty() {
            return Vec::new();
        }

        let deadline = self.timeout;
        let tasks = selected.into_iter().map(|i| {
            let request = request.clone();
            let adapter_identifier = destinations[i].adapter.identifier();
            let max_body_length = destinations[i].adapter.max_body_length();
            let supports_attachments = destinations[i].adapter.supports_attachments();
            // SAFETY-free trick: we can't move `destinations[i].adapter` out of
            // the guard while holding a shared read lock, so we dispatch
            // through a raw reference whose lifetime is bounded by `destinations`
            // (held alive across the join_all below).
            let adapter_ref: &dyn Adapter = destinations[i].adapter.as_ref();
            async move {
                let mut prepared = request.clone();
                if max_body_length > 0 {
                    prepared.body = prepared.body_for_adapter(max_body_length);
                }
                if !prepared.attachments.is_empty() && !supports_attachments {
                    debug!(
                        adapter = adapter_identifier,
                        count = prepared.attachments.len(),
                        "adapter does not support attachments, discarding"
                    );
                    prepared.attachments.clear();
                }

                let start = Instant::now();
                let result = tokio::time::timeout(deadline, adapter_ref.send(&prepared, deadline)).await;
                let elapsed = start.elapsed();

                match result {
                    Ok(Ok(())) => Response {
                        adapter_identifier,
                        success: true,
                        error_kind: None,
                        error_message: None,
                        elapsed,
                    },
                    Ok(Err(kind)) => Response {
                        adapter_identifier,
                        success: false,
                        error_message: Some(kind.to_string()),
                        error_kind: Some(kind),
                        elapsed,
                    },
                    Err(_) => Response {
                        adapter_identifier,
                        success: false,
                        error_kind: Some(ErrorKind::Cancelled),
                        error_message: Some("dispatch timed out".to_string()),
                        elapsed,
                    },
                }
            }
        });

        join_all(tasks).await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Compute the aggregate HTTP-facing outcome: `true` (treat as success) if
/// at least one destination succeeded or there were none selected; `false`
/// if every selected destination failed.
pub fn any_succeeded(responses: &[Response]) -> bool {
    responses.is_empty() || responses.iter().any(|r| r.success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::{FakeAdapter, FakeBehavior};

    #[tokio::test]
    async fn two_adapters_both_succeed_in_registration_order() {
        let dispatcher = Dispatcher::new(Duration::from_secs(5));
        dispatcher.add(Box::new(FakeAdapter::new("fake-a")), []).await;
        dispatcher.add(Box::new(FakeAdapter::new("fake-b")), []).await;

        let req = NotificationRequest::new("B").with_title("T");
        let responses = dispatcher.notify(&req, &NotifyOptions::default()).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].adapter_identifier, "fake-a");
        assert_eq!(responses[1].adapter_identifier, "fake-b");
        assert!(responses.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn empty_destinations_yields_empty_responses_no_error() {
        let dispatcher = Dispatcher::new(Duration::from_secs(5));
        let req = NotificationRequest::new("B");
        let responses = dispatcher.notify(&req, &NotifyOptions::default()).await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn empty_body_yields_single_invalid_request_response() {
        let dispatcher = Dispatcher::new(Duration::from_secs(5));
        dispatcher.add(Box::new(FakeAdapter::new("fake-a")), []).await;
        let req = NotificationRequest::new("");
        let responses = dispatcher.notify(&req, &NotifyOptions::default()).await;
        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0].error_kind, Some(ErrorKind::InvalidRequest)));
    }

    #[tokio::test]
    async fn empty_tag_filter_selects_all_destinations() {
        let dispatcher = Dispatcher::new(Duration::from_secs(5));
        dispatcher
            .add(Box::new(FakeAdapter::new("fake-a")), ["ops".to_string()])
            .await;
        dispatcher
            .add(Box::new(FakeAdapter::new("fake-b")), ["billing".to_string()])
            .await;
        let req = NotificationRequest::new("B");
        let responses = dispatcher.notify(&req, &NotifyOptions::default()).await;
        assert_eq!(responses.len(), 2);
    }

    #[tokio::test]
    async fn tag_filter_selects_only_intersecting_destinations() {
        let dispatcher = Dispatcher::new(Duration::from_secs(5));
        dispatcher
            .add(Box::new(FakeAdapter::new("fake-a")), ["ops".to_string()])
            .await;
        dispatcher
            .add(Box::new(FakeAdapter::new("fake-b")), ["billing".to_string()])
            .await;
        let options = NotifyOptions {
            tags: ["ops".to_string()].into_iter().collect(),
        };
        let req = NotificationRequest::new("B");
        let responses = dispatcher.notify(&req, &options).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].adapter_identifier, "fake-a");
    }

    #[tokio::test]
    async fn slow_destination_is_cut_off_by_engine_timeout() {
        let dispatcher = Dispatcher::new(Duration::from_millis(100));
        dispatcher.add(Box::new(FakeAdapter::new("fast")), []).await;
        dispatcher
            .add(
                Box::new(FakeAdapter::with_behavior("slow", FakeBehavior::HangForever)),
                [],
            )
            .await;

        let req = NotificationRequest::new("B");
        let start = Instant::now();
        let responses = dispatcher.notify(&req, &NotifyOptions::default()).await;
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_secs(1));
        assert!(responses[0].success);
        assert!(matches!(responses[1].error_kind, Some(ErrorKind::Cancelled)));
    }

    #[tokio::test]
    async fn transient_failure_is_recorded_not_propagated_as_engine_error() {
        let dispatcher = Dispatcher::new(Duration::from_secs(5));
        dispatcher
            .add(
                Box::new(FakeAdapter::with_behavior(
                    "fail",
                    FakeBehavior::Fail(ErrorKind::TransientRemote("boom".into())),
                )),
                [],
            )
            .await;
        let req = NotificationRequest::new("B");
        let responses = dispatcher.notify(&req, &NotifyOptions::default()).await;
        assert_eq!(responses.len(), 1);
        assert!(!responses[0].success);
        assert!(!any_succeeded(&responses));
    }
}
