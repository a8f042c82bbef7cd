//! In-memory policy cache.
//!
//! Holds the compiled policies of every enforcement point, keyed by the
//! enforcement point's entity id, plus the sequence id of the policy store
//! revision it was built from.
//!
//! Readers take a lock-free snapshot; writers publish a new snapshot, so an
//! evaluation never sees a half-applied rebuild.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::policy::CompiledPolicy;

/// Sequence id of a cache that has never been built.
pub const SEQUENCE_UNINITIALIZED: i64 = -1;

/// Policies of one enforcement point, in evaluation order.
pub type PolicySet = Arc<Vec<Arc<CompiledPolicy>>>;

#[derive(Debug)]
struct PolicySnapshot {
    policies: HashMap<String, PolicySet>,
    sequence_id: i64,
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self {
            policies: HashMap::new(),
            sequence_id: SEQUENCE_UNINITIALIZED,
        }
    }
}

/// Lock-free cache of compiled policies per enforcement point.
#[derive(Debug, Default)]
pub struct PolicyCache {
    snapshot: ArcSwap<PolicySnapshot>,
}

impl PolicyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Policies of `entity_id`, if the entity is known.
    ///
    /// A known entity may have an empty set when all of its policies were
    /// removed.
    #[must_use]
    pub fn policies(&self, entity_id: &str) -> Option<PolicySet> {
        self.snapshot.load().policies.get(entity_id).cloned()
    }

    /// Entity ids with a policy set, in no particular order.
    #[must_use]
    pub fn entities(&self) -> Vec<String> {
        self.snapshot.load().policies.keys().cloned().collect()
    }

    /// Number of entities with a policy set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().policies.len()
    }

    /// Whether no entity has any policies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot
            .load()
            .policies
            .values()
            .all(|set| set.is_empty())
    }

    /// Policy store revision the cache was built from.
    #[must_use]
    pub fn sequence_id(&self) -> i64 {
        self.snapshot.load().sequence_id
    }

    /// Replace the whole cache.
    pub fn replace_all(&self, policies: HashMap<String, PolicySet>, sequence_id: i64) {
        self.snapshot.store(Arc::new(PolicySnapshot {
            policies,
            sequence_id,
        }));
    }

    /// Add or replace the policy sets of the given entities, keeping every
    /// other entity as it is.
    pub fn update(&self, changes: HashMap<String, PolicySet>, sequence_id: i64) {
        self.snapshot.rcu(|current| {
            let mut policies = current.policies.clone();
            for (entity_id, set) in &changes {
                policies.insert(entity_id.clone(), Arc::clone(set));
            }
            PolicySnapshot {
                policies,
                sequence_id,
            }
        });
    }

    /// Record a new revision without changing any policy.
    pub fn set_sequence_id(&self, sequence_id: i64) {
        self.snapshot.rcu(|current| PolicySnapshot {
            policies: current.policies.clone(),
            sequence_id,
        });
    }
}
