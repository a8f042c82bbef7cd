//! Cache clear broadcasting.
//!
//! When an enforcement point's policies change it must replace its group
//! target map and drop every cached decision. The broadcaster renders a
//! `ClearAuthzCacheRequest` carrying one group target per policy resource and
//! delivers it to every cache clear endpoint of the enforcement point.
//! Deliveries that fail are handed to the [`FailureRepository`] for the
//! [`CacheUpdateFailureMonitor`](crate::monitor::CacheUpdateFailureMonitor)
//! to retry.

use esoe_core::protocol::{ClearAuthzCacheRequest, Extensions, RequestHeader};
use esoe_core::{DocumentCodec, PdpConfig, ProtocolDocument, Transport, generate_id};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::PdpResult;
use crate::error::PdpError;
use crate::extractor;
use crate::failures::{FailedCacheUpdate, FailureRepository};
use crate::metadata::SpepMetadata;
use crate::policy_cache::PolicyCache;

/// Reason sent when policies changed.
pub const REASON_POLICY_CHANGE: &str = "Authorization policy update";

/// Reason sent to an enforcement point that has just started.
pub const REASON_SPEP_STARTUP: &str = "SPEP startup notification";

/// Broadcast statistics.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    /// Requests delivered and acknowledged.
    pub delivered: u64,
    /// Requests that failed.
    pub failed: u64,
}

/// Sends cache clear requests to enforcement points.
pub struct CacheClearBroadcaster {
    config: PdpConfig,
    policies: Arc<PolicyCache>,
    metadata: Arc<dyn SpepMetadata>,
    codec: Arc<dyn DocumentCodec>,
    transport: Arc<dyn Transport>,
    failures: Arc<FailureRepository>,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl CacheClearBroadcaster {
    pub fn new(
        config: PdpConfig,
        policies: Arc<PolicyCache>,
        metadata: Arc<dyn SpepMetadata>,
        codec: Arc<dyn DocumentCodec>,
        transport: Arc<dyn Transport>,
        failures: Arc<FailureRepository>,
    ) -> Self {
        Self {
            config,
            policies,
            metadata,
            codec,
            transport,
            failures,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Render the cache clear request for `entity_id`.
    ///
    /// Returns `None` when the policy cache knows nothing about the entity.
    /// An entity whose policies were all removed gets a request without
    /// extensions, which clears its group target map.
    #[must_use]
    pub fn build_request(
        &self,
        entity_id: &str,
        endpoint: &str,
        reason: &str,
    ) -> Option<ClearAuthzCacheRequest> {
        let policies = self.policies.policies(entity_id)?;

        let group_targets: Vec<_> = policies
            .iter()
            .flat_map(|policy| extractor::policy_group_targets(policy))
            .collect();

        tracing::debug!(
            entity_id,
            policies = policies.len(),
            group_targets = group_targets.len(),
            "Generated cache clear request"
        );

        let mut header = RequestHeader::new(generate_id(), &self.config.esoe_identifier);
        header.destination = Some(endpoint.to_string());

        Some(ClearAuthzCacheRequest {
            header,
            reason: Some(reason.to_string()),
            subject: None,
            extensions: (!group_targets.is_empty())
                .then(|| Extensions::from_group_targets(group_targets)),
        })
    }

    /// Notify every cache clear endpoint of each entity that its policies
    /// changed.
    ///
    /// Failed deliveries are recorded for retry. Entities without metadata
    /// are skipped with a warning since nothing could ever deliver to them.
    pub async fn notify_cache_update(&self, entities: &[String]) {
        for entity_id in entities {
            let endpoints = match self.metadata.cache_clear_endpoints(entity_id) {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    tracing::warn!(entity_id = %entity_id, error = %e, "Cannot notify enforcement point");
                    continue;
                }
            };

            for endpoint in endpoints.values() {
                let Some(request) = self.build_request(entity_id, endpoint, REASON_POLICY_CHANGE)
                else {
                    tracing::warn!(
                        entity_id = %entity_id,
                        "No policies cached for enforcement point, skipping notification"
                    );
                    continue;
                };

                match self.send(endpoint, &request).await {
                    Ok(()) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(endpoint = %endpoint, error = %e, "Cache clear delivery failed");
                        self.failures.add(FailedCacheUpdate::new(endpoint.clone(), request));
                    }
                }
            }
        }
    }

    /// Send the current policy set to an enforcement point that has just
    /// started, using its cache clear endpoint at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint is unknown, the entity has no
    /// policies, or delivery fails. Failures are not queued for retry.
    pub async fn spep_starting_notification(&self, entity_id: &str, index: u32) -> PdpResult<()> {
        let endpoint = self.metadata.cache_clear_endpoint(entity_id, index)?;

        let request = self
            .build_request(entity_id, &endpoint, REASON_SPEP_STARTUP)
            .ok_or_else(|| PdpError::NoPolicies {
                entity_id: entity_id.to_string(),
            })?;

        match self.send(&endpoint, &request).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::info!(entity_id, endpoint = %endpoint, "Sent startup policy set to enforcement point");
                Ok(())
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn send(&self, endpoint: &str, request: &ClearAuthzCacheRequest) -> PdpResult<()> {
        send_cache_clear(self.codec.as_ref(), self.transport.as_ref(), endpoint, request).await
    }

    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn failures(&self) -> &Arc<FailureRepository> {
        &self.failures
    }
}

/// Deliver one cache clear request and check the acknowledgement.
pub(crate) async fn send_cache_clear(
    codec: &dyn DocumentCodec,
    transport: &dyn Transport,
    endpoint: &str,
    request: &ClearAuthzCacheRequest,
) -> PdpResult<()> {
    let document = codec.marshal_signed(&ProtocolDocument::from(request.clone()))?;

    tracing::info!(endpoint, request_id = %request.header.id, "Sending cache clear request");
    let reply = transport.send(endpoint, document).await?;

    let response = codec
        .unmarshal_signed(&reply)?
        .into_clear_authz_cache_response()?;

    if response.status.is_success() {
        tracing::debug!(endpoint, "Cache clear acknowledged");
        Ok(())
    } else {
        Err(PdpError::CacheClearRefused {
            endpoint: endpoint.to_string(),
            message: format!(
                "{}: {}",
                response.status.code.urn(),
                response.status.message.unwrap_or_default()
            ),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
