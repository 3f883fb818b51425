//! Mock Image Store Implementation
//!
//! Programmable mock for testing materialization workflows:
//! - `MockImageStore`: records every upload and hands out durable-looking URLs
//! - `MockUploadBehavior`: controls outcome globally or per payload
//! - `MockOutcome`: Succeed or Fail

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use crate::{CdnError, ImageStore, UploadReceipt, UploadRequest};

/// Host every mock URL is served from
pub const MOCK_CDN_BASE: &str = "https://res.cloudinary.com/mock/image/upload";

/// What outcome the mock should produce
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MockOutcome {
    /// Return a durable URL
    #[default]
    Succeed,
    /// Reject every upload
    Fail,
}

/// Programmable behavior for the mock image store
#[derive(Debug, Clone, Default)]
pub struct MockUploadBehavior {
    pub outcome: Arc<RwLock<MockOutcome>>,
    /// Payloads that fail regardless of the global outcome
    pub failing_payloads: Arc<RwLock<HashSet<String>>>,
    /// Number of upcoming uploads that fail before the outcome applies again
    pub transient_failures: Arc<RwLock<u32>>,
}

impl MockUploadBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the global outcome
    pub fn set_outcome(&self, outcome: MockOutcome) {
        *self.outcome.write().unwrap() = outcome;
    }

    /// Make uploads of this exact payload fail
    pub fn fail_payload(&self, payload: impl Into<String>) {
        self.failing_payloads.write().unwrap().insert(payload.into());
    }

    /// Fail the next `count` uploads, then recover
    pub fn fail_next(&self, count: u32) {
        *self.transient_failures.write().unwrap() = count;
    }

    /// Reset to default behavior
    pub fn reset(&self) {
        *self.outcome.write().unwrap() = MockOutcome::Succeed;
        self.failing_payloads.write().unwrap().clear();
        *self.transient_failures.write().unwrap() = 0;
    }

    fn should_fail(&self, payload: &str) -> bool {
        if self.failing_payloads.read().unwrap().contains(payload) {
            return true;
        }
        let mut transient = self.transient_failures.write().unwrap();
        if *transient > 0 {
            *transient -= 1;
            return true;
        }
        *self.outcome.read().unwrap() == MockOutcome::Fail
    }
}

/// Mock image store with programmable behavior
#[derive(Debug, Clone, Default)]
pub struct MockImageStore {
    behavior: Arc<MockUploadBehavior>,
    history: Arc<Mutex<Vec<UploadRequest>>>,
}

impl MockImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: Arc<MockUploadBehavior>) -> Self {
        Self {
            behavior,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the shared behavior for external configuration
    pub fn behavior(&self) -> &Arc<MockUploadBehavior> {
        &self.behavior
    }

    /// Get every upload attempted so far, failed ones included
    pub fn recorded_uploads(&self) -> Vec<UploadRequest> {
        self.history.lock().unwrap().clone()
    }

    /// Number of upload calls so far
    pub fn upload_count(&self) -> usize {
        self.history.lock().unwrap().len()
    }

    /// Clear history
    pub fn reset_history(&self) {
        self.history.lock().unwrap().clear();
    }

    /// URL the mock hands out for a request
    pub fn url_for(request: &UploadRequest) -> String {
        format!("{}/{}/{}.png", MOCK_CDN_BASE, request.folder, request.filename)
    }
}

#[async_trait::async_trait]
impl ImageStore for MockImageStore {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, CdnError> {
        tracing::info!(filename = %request.filename, "Mock CDN: received upload");

        self.history
            .lock()
            .map_err(|e| CdnError::Request(format!("history lock poisoned: {e}")))?
            .push(request.clone());

        if self.behavior.should_fail(&request.file) {
            tracing::info!(filename = %request.filename, "Mock CDN: simulating upload failure");
            return Err(CdnError::Response("Mock upload failure".to_string()));
        }

        Ok(UploadReceipt {
            url: Self::url_for(&request),
        })
    }
}
