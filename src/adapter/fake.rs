//! An in-memory adapter used only by tests (registry, dispatch) to assert on
//! call counts and ordering without touching the network.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{Adapter, ErrorKind};
use crate::notification::NotificationRequest;

/// What a `FakeAdapter::send` call should do, chosen up front so tests can
/// exercise both the success and failure/retry paths.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    Succeed,
    Fail(ErrorKind),
    /// Sleep past `timeout` so the caller's own timeout wrapper fires first.
    HangForever,
}

pub struct FakeAdapter {
    identifier: &'static str,
    behavior: FakeBehavior,
    calls: Mutex<Vec<NotificationRequest>>,
}

impl FakeAdapter {
    pub fn new(identifier: &'static str) -> Self {
        Self {
            identifier,
            behavior: FakeBehavior::Succeed,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(identifier: &'static str, behavior: FakeBehavior) -> Self {
        Self {
            identifier,
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    fn identifier(&self) -> &'static str {
        self.identifier
    }

    fn supports_attachments(&self) -> bool {
        true
    }

    async fn send(
        &self,
        request: &NotificationRequest,
        timeout: Duration,
    ) -> Result<(), ErrorKind> {
        self.calls.lock().unwrap().push(request.clone());
        match &self.behavior {
            FakeBehavior::Succeed => Ok(()),
            FakeBehavior::Fail(kind) => Err(kind.clone()),
            FakeBehavior::HangForever => {
                tokio::time::sleep(timeout + Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}
