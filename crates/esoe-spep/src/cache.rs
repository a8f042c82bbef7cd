//! Per-principal decision cache.
//!
//! The cache remembers permit/deny outcomes learned from the decision point,
//! keyed by principal and organised by group target and authz target
//! patterns:
//!
//! ```text
//! principal ─┬─ group target "/admin/.*" ─┬─ authz target "/admin/secure/.*" ─ [(action, decision), ...]
//!            │                            └─ authz target "/admin/.*\.jsp"   ─ []
//!            └─ group target "/.*\.jsp"   ─── ...
//! ```
//!
//! ## Concurrency
//!
//! The installed group target map and the principal table live together in
//! one snapshot behind an [`ArcSwapOption`]. [`DecisionCache::invalidate_all`]
//! replaces the whole snapshot in a single store, so a concurrent lookup sees
//! either the old map with old entries or the new map with no entries.
//!
//! The principal table is a [`DashMap`], so lookups and populates for
//! different principals do not contend. Each principal's nested structure is
//! guarded by its own `RwLock`.
//!
//! # Example
//!
//! ```ignore
//! use esoe_spep::{DecisionCache, PrincipalSession};
//! use esoe_core::{Decision, DefaultDecision, GroupTargetMap};
//!
//! let cache = DecisionCache::new(DefaultDecision::Deny);
//! let mut map = GroupTargetMap::new();
//! map.insert("/admin/.*".to_string(), vec!["/admin/secure/.*".to_string()]);
//! cache.invalidate_all(map);
//!
//! let session = PrincipalSession::new("session-1");
//! cache.populate(&session, "/admin/.*", &["/admin/secure/.*".to_string()], None, Decision::Permit)?;
//! assert_eq!(cache.lookup(&session, "/admin/secure/a", None)?, Decision::Permit);
//! ```

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use esoe_core::{
    AUTHZ_TARGET, Decision, DefaultDecision, GroupTargetMap, TargetPattern, action_matches,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CacheError;
use crate::session::PrincipalSession;

// =============================================================================
// Compiled group target map
// =============================================================================

/// A group target with its patterns compiled.
#[derive(Debug)]
struct CompiledGroupTarget {
    pattern: Arc<TargetPattern>,
    authz_targets: IndexMap<String, Arc<TargetPattern>>,
}

/// Everything that is replaced together on a full invalidation.
struct CacheSnapshot {
    source: GroupTargetMap,
    targets: IndexMap<String, CompiledGroupTarget>,
    principals: DashMap<String, Arc<RwLock<PrincipalCache>>>,
}

impl CacheSnapshot {
    fn compile(source: GroupTargetMap) -> Self {
        let targets = source
            .iter()
            .map(|(group, authz)| {
                let compiled = CompiledGroupTarget {
                    pattern: Arc::new(TargetPattern::new(group.as_str())),
                    authz_targets: authz
                        .iter()
                        .map(|a| (a.clone(), Arc::new(TargetPattern::new(a.as_str()))))
                        .collect(),
                };
                (group.clone(), compiled)
            })
            .collect();

        Self {
            source,
            targets,
            principals: DashMap::new(),
        }
    }
}

// =============================================================================
// Per-principal structure
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct CachedDecision {
    action: Option<TargetPattern>,
    decision: Decision,
}

#[derive(Debug)]
struct AuthzTargetEntry {
    pattern: Arc<TargetPattern>,
    decisions: Vec<CachedDecision>,
}

#[derive(Debug)]
struct GroupTargetEntry {
    pattern: Arc<TargetPattern>,
    authz_targets: IndexMap<String, AuthzTargetEntry>,
}

impl GroupTargetEntry {
    /// Fold every entry of every matching authz target.
    ///
    /// An authz target with no stored decisions yields `NotCached`.
    fn lookup(&self, resource: &str, action: Option<&str>) -> Option<Decision> {
        let mut result: Option<Decision> = None;

        for entry in self.authz_targets.values() {
            if !entry.pattern.matches(resource) {
                continue;
            }

            if entry.decisions.is_empty() {
                result = Some(Decision::accumulate(result, Decision::NotCached));
                continue;
            }

            for cached in &entry.decisions {
                if action_matches(cached.action.as_ref(), action) {
                    result = Some(Decision::accumulate(result, cached.decision));
                }
            }
        }

        result
    }
}

/// One principal's cached decisions, seeded from the group target map.
#[derive(Debug)]
struct PrincipalCache {
    groups: IndexMap<String, GroupTargetEntry>,
}

impl PrincipalCache {
    fn seeded(targets: &IndexMap<String, CompiledGroupTarget>) -> Self {
        let groups = targets
            .iter()
            .map(|(id, target)| {
                let authz_targets = target
                    .authz_targets
                    .iter()
                    .map(|(authz, pattern)| {
                        (
                            authz.clone(),
                            AuthzTargetEntry {
                                pattern: Arc::clone(pattern),
                                decisions: Vec::new(),
                            },
                        )
                    })
                    .collect();
                (
                    id.clone(),
                    GroupTargetEntry {
                        pattern: Arc::clone(&target.pattern),
                        authz_targets,
                    },
                )
            })
            .collect();

        Self { groups }
    }

    fn lookup(&self, resource: &str, action: Option<&str>) -> Option<Decision> {
        let mut result: Option<Decision> = None;

        for group in self.groups.values() {
            if !group.pattern.matches(resource) {
                continue;
            }

            if let Some(decision) = group.lookup(resource, action) {
                let combined = Decision::accumulate(result, decision);
                if combined.is_terminal() {
                    return Some(combined);
                }
                result = Some(combined);
            }
        }

        result
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Decision cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct DecisionCacheStats {
    /// Number of cached principals.
    pub principals: usize,
    /// Number of group targets in the installed map.
    pub group_targets: usize,
    /// Lookups answered from the cache or by default.
    pub hits: u64,
    /// Lookups answered with `NotCached`.
    pub misses: u64,
    /// Successful populate calls.
    pub populates: u64,
    /// Full invalidations.
    pub full_invalidations: u64,
    /// Single principal invalidations.
    pub principal_invalidations: u64,
}

impl DecisionCacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

// =============================================================================
// Decision Cache
// =============================================================================

/// Per-principal cache of authorization decisions.
pub struct DecisionCache {
    default_decision: DefaultDecision,
    snapshot: ArcSwapOption<CacheSnapshot>,
    hits: AtomicU64,
    misses: AtomicU64,
    populates: AtomicU64,
    full_invalidations: AtomicU64,
    principal_invalidations: AtomicU64,
}

impl DecisionCache {
    /// Create an uninitialized cache.
    ///
    /// Lookups fail with [`CacheError::Uninitialized`] until a group target
    /// map is installed with [`DecisionCache::invalidate_all`].
    #[must_use]
    pub fn new(default_decision: DefaultDecision) -> Self {
        Self {
            default_decision,
            snapshot: ArcSwapOption::empty(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            populates: AtomicU64::new(0),
            full_invalidations: AtomicU64::new(0),
            principal_invalidations: AtomicU64::new(0),
        }
    }

    /// The decision returned when nothing more specific is known.
    #[must_use]
    pub fn default_decision(&self) -> DefaultDecision {
        self.default_decision
    }

    /// Whether a group target map has been installed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.snapshot.load_full().is_some()
    }

    /// Look up the cached decision for a principal's access to a resource.
    ///
    /// Returns the default decision when the installed map is empty or when
    /// no cached target covers the resource, and `NotCached` when the
    /// principal has no cache yet or a covering target has no entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Uninitialized`] if no map has been installed.
    pub fn lookup(
        &self,
        session: &PrincipalSession,
        resource: &str,
        action: Option<&str>,
    ) -> Result<Decision, CacheError> {
        let snapshot = self.snapshot.load_full().ok_or(CacheError::Uninitialized)?;

        if snapshot.targets.is_empty() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(self.default_decision.into());
        }

        let principal = match snapshot.principals.get(session.cache_key()) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(Decision::NotCached);
            }
        };

        let found = principal.read().lookup(resource, action);

        let decision = found.unwrap_or_else(|| self.default_decision.into());
        if decision == Decision::NotCached {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        tracing::trace!(
            target: AUTHZ_TARGET,
            principal = %session.cache_key(),
            resource,
            action = action.unwrap_or("-"),
            decision = %decision,
            "Decision cache lookup"
        );

        Ok(decision)
    }

    /// Record a decision for a group target and its authz targets.
    ///
    /// Only targets present in the installed map are stored; anything else
    /// is skipped. A `NotCached` decision creates the principal's cache
    /// without storing an entry. Storing an entry equal to an existing one
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Uninitialized`] if no map has been installed.
    pub fn populate(
        &self,
        session: &PrincipalSession,
        group_target: &str,
        authz_targets: &[String],
        action: Option<&str>,
        decision: Decision,
    ) -> Result<(), CacheError> {
        let snapshot = self.snapshot.load_full().ok_or(CacheError::Uninitialized)?;

        if !snapshot.targets.contains_key(group_target) {
            tracing::warn!(
                principal = %session.cache_key(),
                group_target,
                "Group target is not in the installed map, not caching"
            );
            return Ok(());
        }

        let principal = Arc::clone(
            snapshot
                .principals
                .entry(session.cache_key().to_string())
                .or_insert_with(|| {
                    Arc::new(RwLock::new(PrincipalCache::seeded(&snapshot.targets)))
                })
                .value(),
        );

        if decision == Decision::NotCached {
            return Ok(());
        }

        let mut cache = principal.write();
        let Some(group) = cache.groups.get_mut(group_target) else {
            return Ok(());
        };

        let action_pattern = action.map(TargetPattern::new);
        for authz_target in authz_targets {
            let Some(entry) = group.authz_targets.get_mut(authz_target) else {
                tracing::debug!(
                    group_target,
                    authz_target = %authz_target,
                    "Authz target is not declared for group target, skipping"
                );
                continue;
            };

            let cached = CachedDecision {
                action: action_pattern.clone(),
                decision,
            };
            if !entry.decisions.contains(&cached) {
                entry.decisions.push(cached);
            }
        }

        self.populates.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            principal = %session.cache_key(),
            group_target,
            authz_targets = authz_targets.len(),
            decision = %decision,
            "Decision cache populated"
        );

        Ok(())
    }

    /// Install a new group target map and discard every principal's cache.
    pub fn invalidate_all(&self, group_targets: GroupTargetMap) {
        let snapshot = Arc::new(CacheSnapshot::compile(group_targets));
        let group_target_count = snapshot.targets.len();

        let previous = self.snapshot.swap(Some(snapshot));
        let dropped = previous.map_or(0, |p| p.principals.len());

        self.full_invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            group_targets = group_target_count,
            dropped_principals = dropped,
            "Decision cache cleared and group target map installed"
        );
    }

    /// Discard one principal's cached decisions.
    pub fn invalidate_principal(&self, session: &PrincipalSession) {
        self.invalidate_principal_id(session.cache_key());
    }

    /// Discard cached decisions by ESOE session identifier.
    ///
    /// Returns true if the principal had cached decisions.
    pub fn invalidate_principal_id(&self, esoe_session_id: &str) -> bool {
        let removed = self
            .snapshot
            .load_full()
            .is_some_and(|s| s.principals.remove(esoe_session_id).is_some());

        self.principal_invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(principal = %esoe_session_id, removed, "Principal cache cleared");
        removed
    }

    /// The currently installed group target map.
    #[must_use]
    pub fn group_targets(&self) -> Option<GroupTargetMap> {
        self.snapshot.load_full().map(|s| s.source.clone())
    }

    /// Number of principals with a cache.
    #[must_use]
    pub fn principal_count(&self) -> usize {
        self.snapshot
            .load_full()
            .map_or(0, |s| s.principals.len())
    }

    /// Get cache statistics.
    #[must_use]
    pub fn stats(&self) -> DecisionCacheStats {
        let snapshot = self.snapshot.load_full();
        DecisionCacheStats {
            principals: snapshot.as_ref().map_or(0, |s| s.principals.len()),
            group_targets: snapshot.as_ref().map_or(0, |s| s.targets.len()),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            populates: self.populates.load(Ordering::Relaxed),
            full_invalidations: self.full_invalidations.load(Ordering::Relaxed),
            principal_invalidations: self.principal_invalidations.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DecisionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCache")
            .field("default_decision", &self.default_decision)
            .field("initialized", &self.is_initialized())
            .field("principals", &self.principal_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
