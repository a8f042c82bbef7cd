//! Retry of undelivered cache clear requests.
//!
//! Every `retry_interval` the monitor takes the recorded failures and sends
//! each request again. Requests are reissued with a fresh ID and issue
//! instant since the original will usually be outside the receiver's allowed
//! clock skew by then. A failure is dropped once delivered, or once it is
//! older than `max_failure_age`.

use esoe_core::{DocumentCodec, PdpConfig, Transport, generate_id};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Notify;

use crate::broadcast::send_cache_clear;
use crate::failures::{FailedCacheUpdate, FailureRepository};

/// Outcome of one pass over the failure repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub expired: usize,
    pub retained: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    /// Delivery attempts made.
    pub attempts: u64,
    /// Failures delivered on retry.
    pub delivered: u64,
    /// Failures dropped for age.
    pub expired: u64,
}

/// Background retry of failed cache clear deliveries.
pub struct CacheUpdateFailureMonitor {
    failures: Arc<FailureRepository>,
    codec: Arc<dyn DocumentCodec>,
    transport: Arc<dyn Transport>,
    retry_interval: Duration,
    max_failure_age: Duration,
    shutdown: AtomicBool,
    wake: Notify,
    attempts: AtomicU64,
    delivered: AtomicU64,
    expired: AtomicU64,
}

impl CacheUpdateFailureMonitor {
    pub fn new(
        config: &PdpConfig,
        failures: Arc<FailureRepository>,
        codec: Arc<dyn DocumentCodec>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        tracing::info!(
            retry_interval = ?config.retry_interval,
            max_failure_age = ?config.max_failure_age,
            "Cache update failure monitor configured"
        );

        Self {
            failures,
            codec,
            transport,
            retry_interval: config.retry_interval,
            max_failure_age: config.max_failure_age,
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
            attempts: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) {
        loop {
            if self.is_shutting_down() {
                break;
            }

            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.retry_interval) => {
                    self.flush().await;
                }
            }
        }

        tracing::info!("Cache update failure monitor stopped");
    }

    /// Retry every recorded failure once.
    pub async fn flush(&self) -> FlushReport {
        let pending = self.failures.drain();
        if pending.is_empty() {
            return FlushReport::default();
        }

        tracing::debug!(failures = pending.len(), "Retrying failed cache updates");

        let mut report = FlushReport::default();
        for failure in pending {
            match self.retry(failure).await {
                Ok(endpoint) => {
                    report.delivered += 1;
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(endpoint = %endpoint, "Failed cache update delivered on retry");
                }
                Err(failure) => {
                    let age = OffsetDateTime::now_utc() - failure.recorded_at;
                    if age > self.max_failure_age {
                        report.expired += 1;
                        self.expired.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            endpoint = %failure.endpoint,
                            age_secs = age.whole_seconds(),
                            "Dropping cache update that could not be delivered in time"
                        );
                    } else {
                        report.retained += 1;
                        self.failures.add(failure);
                    }
                }
            }
        }

        report
    }

    /// Reissue and send a failed request. Hands the failure back on error.
    async fn retry(&self, mut failure: FailedCacheUpdate) -> Result<String, FailedCacheUpdate> {
        failure.request.header.id = generate_id();
        failure.request.header.issue_instant = OffsetDateTime::now_utc();

        self.attempts.fetch_add(1, Ordering::Relaxed);
        match send_cache_clear(
            self.codec.as_ref(),
            self.transport.as_ref(),
            &failure.endpoint,
            &failure.request,
        )
        .await
        {
            Ok(()) => Ok(failure.endpoint),
            Err(e) => {
                tracing::info!(endpoint = %failure.endpoint, error = %e, "Cache update retry failed");
                Err(failure)
            }
        }
    }

    /// Signal the monitor to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use esoe_core::protocol::{
        ClearAuthzCacheRequest, ClearAuthzCacheResponse, NameId, RequestHeader, SAML_VERSION,
        Status,
    };
    use esoe_core::{JsonDocumentCodec, ProtocolDocument, TransportError};
    use std::sync::Mutex;

    /// Fails until `up` is set, recording the request ids it was sent.
    struct FlakySpep {
        up: AtomicBool,
        ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for FlakySpep {
        async fn send(&self, endpoint: &str, document: Vec<u8>) -> Result<Vec<u8>, TransportError> {
            let request = JsonDocumentCodec
                .unmarshal_signed(&document)
                .and_then(ProtocolDocument::into_clear_authz_cache_request)
                .expect("cache clear request");
            self.ids.lock().unwrap().push(request.header.id.clone());

            if !self.up.load(Ordering::SeqCst) {
                return Err(TransportError::connect(endpoint, "down"));
            }

            let response = ClearAuthzCacheResponse {
                id: generate_id(),
                in_response_to: Some(request.header.id),
                version: SAML_VERSION.to_string(),
                issue_instant: OffsetDateTime::now_utc(),
                issuer: NameId::new("spep"),
                status: Status::success(),
            };
            Ok(JsonDocumentCodec.marshal_signed(&response.into()).expect("marshal"))
        }
    }

    fn failure(recorded_at: OffsetDateTime) -> FailedCacheUpdate {
        let mut failure = FailedCacheUpdate::new(
            "https://spep/clear",
            ClearAuthzCacheRequest {
                header: RequestHeader::new("_original", "https://esoe.example.com"),
                reason: None,
                subject: None,
                extensions: None,
            },
        );
        failure.recorded_at = recorded_at;
        failure
    }

    fn monitor(spep: Arc<FlakySpep>, failures: Arc<FailureRepository>) -> CacheUpdateFailureMonitor {
        let config = PdpConfig {
            retry_interval: Duration::from_millis(10),
            max_failure_age: Duration::from_secs(60),
            ..Default::default()
        };
        CacheUpdateFailureMonitor::new(&config, failures, Arc::new(JsonDocumentCodec), spep)
    }

    fn spep(up: bool) -> Arc<FlakySpep> {
        Arc::new(FlakySpep {
            up: AtomicBool::new(up),
            ids: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_flush_delivers_with_new_id() {
        let spep = spep(true);
        let failures = Arc::new(FailureRepository::new());
        failures.add(failure(OffsetDateTime::now_utc()));
        let monitor = monitor(Arc::clone(&spep), Arc::clone(&failures));

        let report = monitor.flush().await;

        assert_eq!(report.delivered, 1);
        assert!(failures.is_empty());
        let ids = spep.ids.lock().unwrap();
        assert_eq!(ids.len(), 1);
        assert_ne!(ids[0], "_original");
    }

    #[tokio::test]
    async fn test_flush_retains_recent_failure() {
        let spep = spep(false);
        let failures = Arc::new(FailureRepository::new());
        failures.add(failure(OffsetDateTime::now_utc()));
        let monitor = monitor(Arc::clone(&spep), Arc::clone(&failures));

        let report = monitor.flush().await;
        assert_eq!(report.retained, 1);
        assert_eq!(failures.len(), 1);

        // Each retry is reissued under a new id.
        monitor.flush().await;
        let ids = spep.ids.lock().unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_flush_drops_expired_failure() {
        let spep = spep(false);
        let failures = Arc::new(FailureRepository::new());
        failures.add(failure(OffsetDateTime::now_utc() - time::Duration::hours(2)));
        let monitor = monitor(spep, Arc::clone(&failures));

        let report = monitor.flush().await;
        assert_eq!(report.expired, 1);
        assert!(failures.is_empty());
        assert_eq!(monitor.stats().expired, 1);
    }

    #[tokio::test]
    async fn test_run_retries_until_shutdown() {
        let spep = spep(true);
        let failures = Arc::new(FailureRepository::new());
        failures.add(failure(OffsetDateTime::now_utc()));
        let monitor = Arc::new(monitor(spep, Arc::clone(&failures)));

        let handle = tokio::spawn({
            let monitor = Arc::clone(&monitor);
            async move { monitor.run().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.shutdown();
        handle.await.expect("monitor task");

        assert!(failures.is_empty());
        assert_eq!(monitor.stats().delivered, 1);
    }
}
