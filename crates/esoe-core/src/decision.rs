//! Authorization decisions and the combination algebra.
//!
//! A [`Decision`] is the outcome of consulting the decision cache or the
//! remote policy decision point. Partial decisions collected from several
//! cache entries are folded together with [`Decision::combine`].
//!
//! # Example
//!
//! ```ignore
//! use esoe_core::Decision;
//!
//! let folded = [Decision::Permit, Decision::NotCached, Decision::Permit]
//!     .into_iter()
//!     .fold(Decision::Permit, Decision::combine);
//! assert_eq!(folded, Decision::NotCached);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Decision
// =============================================================================

/// Outcome of an authorization check.
///
/// `NotCached` is internal to the enforcement side. It means the local cache
/// holds too little information and the decision point has to be asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Access is granted.
    Permit,
    /// Access is refused.
    Deny,
    /// No authoritative answer could be obtained.
    Error,
    /// The cache cannot answer; the decision point must be queried.
    #[serde(rename = "notcached")]
    NotCached,
}

impl Decision {
    /// Combine two partial decisions.
    ///
    /// `Error` dominates everything, `Deny` dominates `Permit` and
    /// `NotCached`, and `NotCached` is never upgraded to `Permit`.
    ///
    /// | lhs \ rhs | permit    | deny | notcached | error |
    /// |-----------|-----------|------|-----------|-------|
    /// | permit    | permit    | deny | notcached | error |
    /// | deny      | deny      | deny | deny      | error |
    /// | notcached | notcached | deny | notcached | error |
    /// | error     | error     | error| error     | error |
    #[must_use]
    pub fn combine(self, rhs: Decision) -> Decision {
        match (self, rhs) {
            (Decision::Error, _) | (_, Decision::Error) => Decision::Error,
            (Decision::Deny, _) | (_, Decision::Deny) => Decision::Deny,
            (Decision::NotCached, _) | (_, Decision::NotCached) => Decision::NotCached,
            (Decision::Permit, Decision::Permit) => Decision::Permit,
        }
    }

    /// Fold `rhs` into an accumulator that may still be empty.
    ///
    /// An empty accumulator acts as the identity element.
    #[must_use]
    pub fn accumulate(acc: Option<Decision>, rhs: Decision) -> Decision {
        match acc {
            Some(lhs) => lhs.combine(rhs),
            None => rhs,
        }
    }

    /// Returns true if no further combination can change this decision
    /// into something other than a refusal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Decision::Deny | Decision::Error)
    }

    /// Returns true if this is a permit decision.
    #[must_use]
    pub fn is_permit(&self) -> bool {
        matches!(self, Decision::Permit)
    }

    /// Returns true if this is a deny decision.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        matches!(self, Decision::Deny)
    }

    /// Wire-style lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Permit => "permit",
            Decision::Deny => "deny",
            Decision::Error => "error",
            Decision::NotCached => "notcached",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Default Decision
// =============================================================================

/// Decision applied when nothing more specific is known.
///
/// Used by the enforcement side when the group target map is empty or no
/// cached target covers a resource, and by the decision side when no policy
/// matches a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDecision {
    /// Allow by default.
    Permit,
    /// Deny by default.
    #[default]
    Deny,
}

impl From<DefaultDecision> for Decision {
    fn from(value: DefaultDecision) -> Self {
        match value {
            DefaultDecision::Permit => Decision::Permit,
            DefaultDecision::Deny => Decision::Deny,
        }
    }
}

impl fmt::Display for DefaultDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Decision::from(*self).fmt(f)
    }
}

// =============================================================================
// Tests
// =============================================================================
