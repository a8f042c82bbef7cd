//! Repository of cache clear requests that could not be delivered.

use esoe_core::protocol::ClearAuthzCacheRequest;
use parking_lot::{Mutex, MutexGuard};
use time::OffsetDateTime;

/// A cache clear request waiting to be retried.
#[derive(Debug, Clone)]
pub struct FailedCacheUpdate {
    /// Cache clear endpoint of the enforcement point.
    pub endpoint: String,
    /// The request as last sent.
    pub request: ClearAuthzCacheRequest,
    /// When delivery first failed.
    pub recorded_at: OffsetDateTime,
}

impl FailedCacheUpdate {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, request: ClearAuthzCacheRequest) -> Self {
        Self {
            endpoint: endpoint.into(),
            request,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Thread-safe store of failed cache updates.
#[derive(Debug, Default)]
pub struct FailureRepository {
    failures: Mutex<Vec<FailedCacheUpdate>>,
}

impl FailureRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FailedCacheUpdate>> {
        self.failures.lock()
    }

    pub fn add(&self, failure: FailedCacheUpdate) {
        tracing::info!(endpoint = %failure.endpoint, "Recorded failed cache update");
        self.lock().push(failure);
    }

    /// Remove and return every recorded failure.
    #[must_use]
    pub fn drain(&self) -> Vec<FailedCacheUpdate> {
        std::mem::take(&mut *self.lock())
    }

    /// Copy of the recorded failures.
    #[must_use]
    pub fn failures(&self) -> Vec<FailedCacheUpdate> {
        self.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
