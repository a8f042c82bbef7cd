//! Authorization cache clearing messages.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::saml::{NameId, RequestHeader, Status, Subject};
use crate::target::GroupTarget;

/// An element inside a request's extensions block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtensionElement {
    /// A group target fragment.
    GroupTarget(GroupTarget),
    /// An element this profile ignores.
    Other {
        /// Local name of the element.
        name: String,
    },
}

/// Extensions block of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extensions {
    /// Extension elements in document order.
    #[serde(default)]
    pub elements: Vec<ExtensionElement>,
}

impl Extensions {
    /// Extensions holding the given group targets.
    #[must_use]
    pub fn from_group_targets(targets: impl IntoIterator<Item = GroupTarget>) -> Self {
        Self {
            elements: targets
                .into_iter()
                .map(ExtensionElement::GroupTarget)
                .collect(),
        }
    }

    /// Group target fragments, skipping unrelated elements.
    pub fn group_targets(&self) -> impl Iterator<Item = &GroupTarget> {
        self.elements.iter().filter_map(|e| match e {
            ExtensionElement::GroupTarget(target) => Some(target),
            ExtensionElement::Other { .. } => None,
        })
    }
}

/// Request to clear an enforcement point's authorization cache.
///
/// Names a single principal through `subject`, or carries the new group
/// target set in `extensions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearAuthzCacheRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Why the cache is being cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Principal whose cache should be cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    /// New group target set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

/// Response to a [`ClearAuthzCacheRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearAuthzCacheResponse {
    /// Response identifier.
    pub id: String,
    /// Identifier of the request being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
    /// Protocol version.
    pub version: String,
    /// When the response was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issue_instant: OffsetDateTime,
    /// Responding party.
    pub issuer: NameId,
    /// Processing status.
    pub status: Status,
}
