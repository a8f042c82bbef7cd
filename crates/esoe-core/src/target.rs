//! Group targets: coarse resource patterns refined by authz target patterns.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Mapping from group target pattern to its ordered authz target patterns.
pub type GroupTargetMap = IndexMap<String, Vec<String>>;

/// A resource pattern plus the finer patterns that refine it.
///
/// Carried on the wire inside obligations and cache-clear extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTarget {
    /// The group target pattern.
    pub group_target_id: String,

    /// Authz target patterns, in order of first declaration.
    #[serde(default)]
    pub authz_targets: Vec<String>,
}

impl GroupTarget {
    /// Create a group target with no authz targets yet.
    #[must_use]
    pub fn new(group_target_id: impl Into<String>) -> Self {
        Self {
            group_target_id: group_target_id.into(),
            authz_targets: Vec::new(),
        }
    }

    /// Builder-style variant of [`GroupTarget::push_authz_target`].
    #[must_use]
    pub fn with_authz_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for target in targets {
            self.push_authz_target(target);
        }
        self
    }

    /// Append an authz target unless it is already present.
    ///
    /// Returns true if the target was added.
    pub fn push_authz_target(&mut self, target: impl Into<String>) -> bool {
        let target = target.into();
        if self.authz_targets.contains(&target) {
            return false;
        }
        self.authz_targets.push(target);
        true
    }
}

/// Collect group targets into a [`GroupTargetMap`].
///
/// Fragments sharing a group target id are merged, keeping authz targets
/// unique and in order of first occurrence.
#[must_use]
pub fn group_target_map<I>(targets: I) -> GroupTargetMap
where
    I: IntoIterator<Item = GroupTarget>,
{
    let mut map = GroupTargetMap::new();
    for target in targets {
        let entry = map.entry(target.group_target_id).or_default();
        for authz in target.authz_targets {
            if !entry.contains(&authz) {
                entry.push(authz);
            }
        }
    }
    map
}
