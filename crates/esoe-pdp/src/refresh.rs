//! Policy cache refresh.
//!
//! The policy store stamps every change with an increasing sequence id. The
//! [`PolicyCacheProcessor`] polls for the latest id and, when it is ahead of
//! the cache, loads the changed policies, publishes them to the
//! [`PolicyCache`] and tells the affected enforcement points to clear their
//! caches.
//!
//! The first build loads every policy. Later builds only load changes since
//! the cache's sequence id and apply them per entity as add, update or
//! delete.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use crate::PdpResult;
use crate::broadcast::CacheClearBroadcaster;
use crate::error::PolicySourceError;
use crate::policy::{CompiledPolicy, Policy};
use crate::policy_cache::{PolicyCache, PolicySet};

// =============================================================================
// Policy Source
// =============================================================================

/// How a policy changed since a given sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyChange {
    Add,
    Update,
    Delete,
}

/// A policy as stored, with the entity it belongs to.
#[derive(Debug, Clone)]
pub struct PolicyRecord {
    /// Entity id of the enforcement point the policy applies to.
    pub entity_id: String,
    pub policy: Policy,
    /// Change kind; ignored for full loads.
    pub change: PolicyChange,
}

impl PolicyRecord {
    #[must_use]
    pub fn new(entity_id: impl Into<String>, policy: Policy, change: PolicyChange) -> Self {
        Self {
            entity_id: entity_id.into(),
            policy,
            change,
        }
    }
}

/// Store of authorization policies.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Sequence id of the latest change.
    async fn latest_sequence_id(&self) -> Result<i64, PolicySourceError>;

    /// Every stored policy.
    async fn all_policies(&self) -> Result<Vec<PolicyRecord>, PolicySourceError>;

    /// Policies changed after `sequence_id`, in change order.
    async fn changed_policies(
        &self,
        sequence_id: i64,
    ) -> Result<Vec<PolicyRecord>, PolicySourceError>;
}

// =============================================================================
// Processor
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct RefreshStats {
    pub polls: u64,
    pub rebuilds: u64,
    pub failed_polls: u64,
}

/// Keeps the policy cache in step with the policy source.
pub struct PolicyCacheProcessor {
    source: Arc<dyn PolicySource>,
    cache: Arc<PolicyCache>,
    broadcaster: Arc<CacheClearBroadcaster>,
    poll_interval: Duration,
    initialized: AtomicBool,
    shutdown: AtomicBool,
    wake: Notify,
    polls: AtomicU64,
    rebuilds: AtomicU64,
    failed_polls: AtomicU64,
}

impl PolicyCacheProcessor {
    pub fn new(
        source: Arc<dyn PolicySource>,
        cache: Arc<PolicyCache>,
        broadcaster: Arc<CacheClearBroadcaster>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            broadcaster,
            poll_interval,
            initialized: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
            polls: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
            failed_polls: AtomicU64::new(0),
        }
    }

    /// Build the cache, then poll until [`shutdown`](Self::shutdown).
    ///
    /// A failed initial build is retried by the next poll.
    pub async fn run(&self) {
        tracing::info!(poll_interval = ?self.poll_interval, "Policy cache processor started");

        if let Err(e) = self.init().await {
            tracing::error!(error = %e, "Initial policy cache build failed");
        }

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(e) = self.poll().await {
                        self.failed_polls.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, "Policy cache poll failed");
                    }
                }
            }
        }

        tracing::info!("Policy cache processor stopped");
    }

    /// Full rebuild from the policy source.
    ///
    /// # Errors
    ///
    /// Fails when the source has no valid sequence id or no policies.
    pub async fn init(&self) -> PdpResult<()> {
        let latest = self.source.latest_sequence_id().await?;
        if latest <= 0 {
            return Err(PolicySourceError::InvalidSequence {
                sequence_id: latest,
            }
            .into());
        }

        self.build(latest, true).await?;
        self.initialized.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Rebuild the cache if the source has moved past it.
    ///
    /// Returns whether a rebuild happened.
    ///
    /// # Errors
    ///
    /// Fails when the source cannot be read.
    pub async fn poll(&self) -> PdpResult<bool> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        let latest = self.source.latest_sequence_id().await?;
        let current = self.cache.sequence_id();

        tracing::debug!(current, latest, "Checking policy source sequence");
        if current >= latest {
            return Ok(false);
        }

        if self.initialized.load(Ordering::Relaxed) {
            self.build(latest, false).await?;
        } else {
            self.build(latest, true).await?;
            self.initialized.store(true, Ordering::Relaxed);
        }
        Ok(true)
    }

    async fn build(&self, latest: i64, full: bool) -> PdpResult<()> {
        let modified = if full {
            let records = self.source.all_policies().await?;
            if records.is_empty() {
                return Err(PolicySourceError::Empty.into());
            }
            let sets = full_policy_sets(records);
            let modified: Vec<String> = sets.keys().cloned().collect();
            self.cache.replace_all(sets, latest);
            modified
        } else {
            let records = self.source.changed_policies(self.cache.sequence_id()).await?;
            let changes = self.apply_changes(records);
            let modified: Vec<String> = changes.keys().cloned().collect();
            self.cache.update(changes, latest);
            modified
        };

        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            sequence_id = latest,
            full,
            entities = modified.len(),
            "Policy cache rebuilt"
        );

        self.broadcaster.notify_cache_update(&modified).await;
        Ok(())
    }

    /// Apply incremental changes on top of the cached policy sets.
    fn apply_changes(&self, records: Vec<PolicyRecord>) -> HashMap<String, PolicySet> {
        let mut working: HashMap<String, Vec<Arc<CompiledPolicy>>> = HashMap::new();

        for record in records {
            let set = working.entry(record.entity_id.clone()).or_insert_with(|| {
                self.cache
                    .policies(&record.entity_id)
                    .map(|set| set.as_ref().clone())
                    .unwrap_or_default()
            });

            let policy_id = record.policy.policy_id.clone();
            let existing = set.iter().position(|p| p.policy_id() == policy_id);

            match (record.change, existing) {
                (PolicyChange::Update, Some(index)) => {
                    set[index] = Arc::new(CompiledPolicy::new(record.policy));
                }
                (PolicyChange::Update, None) => {
                    set.push(Arc::new(CompiledPolicy::new(record.policy)));
                }
                (PolicyChange::Delete, Some(index)) => {
                    set.remove(index);
                }
                (PolicyChange::Delete, None) => {
                    tracing::debug!(policy_id = %policy_id, "Deleted policy was not cached");
                }
                (PolicyChange::Add, None) => {
                    set.push(Arc::new(CompiledPolicy::new(record.policy)));
                }
                (PolicyChange::Add, Some(_)) => {
                    tracing::warn!(policy_id = %policy_id, "Attempt to add existing policy ignored");
                }
            }
        }

        working
            .into_iter()
            .map(|(entity_id, set)| (entity_id, Arc::new(set)))
            .collect()
    }

    /// Signal the processor to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }

    #[must_use]
    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            polls: self.polls.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            failed_polls: self.failed_polls.load(Ordering::Relaxed),
        }
    }
}

/// Group a full load by entity, the last record for a policy id winning.
fn full_policy_sets(records: Vec<PolicyRecord>) -> HashMap<String, PolicySet> {
    let mut sets: HashMap<String, Vec<Arc<CompiledPolicy>>> = HashMap::new();
    for record in records {
        let set = sets.entry(record.entity_id).or_default();
        let compiled = Arc::new(CompiledPolicy::new(record.policy));
        match set.iter().position(|p| p.policy_id() == compiled.policy_id()) {
            Some(index) => set[index] = compiled,
            None => set.push(compiled),
        }
    }
    sets.into_iter()
        .map(|(entity_id, set)| (entity_id, Arc::new(set)))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
