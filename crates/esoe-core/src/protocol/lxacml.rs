//! LXACML request, result and obligation types.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::saml::RequestHeader;
use crate::error::ValidationError;
use crate::target::GroupTarget;

// =============================================================================
// Requests
// =============================================================================

/// The value of an attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    /// Text content.
    #[serde(default)]
    pub content: Vec<String>,
}

/// A request attribute (subject, resource or action).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_id: Option<String>,
    /// Attribute value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AttributeValue>,
}

impl Attribute {
    /// An attribute carrying a single string value.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            attribute_id: None,
            value: Some(AttributeValue {
                content: vec![value.into()],
            }),
        }
    }

    /// The first string of the attribute value.
    #[must_use]
    pub fn first_value(&self) -> Option<&str> {
        self.value
            .as_ref()
            .and_then(|v| v.content.first())
            .map(String::as_str)
    }
}

/// An LXACML authorization request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LxacmlRequest {
    /// Subject attribute; carries the principal's session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Attribute>,
    /// Resource attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Attribute>,
    /// Action attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Attribute>,
}

impl LxacmlRequest {
    /// Build a request for a subject, resource and optional action.
    #[must_use]
    pub fn new(subject: impl Into<String>, resource: impl Into<String>, action: Option<&str>) -> Self {
        Self {
            subject: Some(Attribute::string(subject)),
            resource: Some(Attribute::string(resource)),
            action: action.map(Attribute::string),
        }
    }

    /// The subject identifier.
    pub fn subject_id(&self) -> Result<&str, ValidationError> {
        self.subject
            .as_ref()
            .and_then(Attribute::first_value)
            .ok_or_else(|| ValidationError::missing("Subject/Attribute/AttributeValue"))
    }

    /// The requested resource.
    pub fn resource(&self) -> Result<&str, ValidationError> {
        self.resource
            .as_ref()
            .and_then(Attribute::first_value)
            .ok_or_else(|| ValidationError::missing("Resource/Attribute/AttributeValue"))
    }

    /// The requested action, if one was sent.
    ///
    /// An action element without a value is malformed.
    pub fn action(&self) -> Result<Option<&str>, ValidationError> {
        match &self.action {
            None => Ok(None),
            Some(attribute) => attribute
                .first_value()
                .map(Some)
                .ok_or_else(|| ValidationError::missing("Action/Attribute/AttributeValue")),
        }
    }
}

/// A signed authorization decision query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzDecisionQuery {
    /// Request header.
    pub header: RequestHeader,
    /// The LXACML request.
    pub request: LxacmlRequest,
}

// =============================================================================
// Results
// =============================================================================

/// Decision carried in an LXACML result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionType {
    /// Access permitted.
    Permit,
    /// Access denied.
    Deny,
    /// The decision point could not decide.
    Indeterminate,
    /// No policy applied.
    NotApplicable,
}

impl DecisionType {
    /// Canonical name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Permit => "Permit",
            DecisionType::Deny => "Deny",
            DecisionType::Indeterminate => "Indeterminate",
            DecisionType::NotApplicable => "NotApplicable",
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effect an obligation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Fulfilled on a permit decision.
    Permit,
    /// Fulfilled on a deny decision.
    Deny,
}

impl Effect {
    /// Canonical name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Permit => "Permit",
            Effect::Deny => "Deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content of an attribute assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentContent {
    /// A group target fragment.
    GroupTarget(GroupTarget),
    /// Plain text.
    Text(String),
}

/// An attribute assignment within an obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeAssignment {
    /// Attribute identifier.
    pub attribute_id: String,
    /// Mixed content.
    #[serde(default)]
    pub content: Vec<AssignmentContent>,
}

/// An obligation attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    /// Obligation identifier.
    pub obligation_id: String,
    /// Effect the obligation applies to.
    pub fulfill_on: Effect,
    /// Attribute assignments.
    #[serde(default)]
    pub attribute_assignments: Vec<AttributeAssignment>,
}

impl Obligation {
    /// Whether this obligation applies to a decision with the given name.
    ///
    /// The comparison ignores ASCII case.
    #[must_use]
    pub fn fulfills_on(&self, decision: &str) -> bool {
        self.fulfill_on.as_str().eq_ignore_ascii_case(decision)
    }
}

/// Status of an LXACML result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LxacmlStatus {
    /// Status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// An LXACML result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LxacmlResult {
    /// The decision.
    pub decision: DecisionType,
    /// Result status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LxacmlStatus>,
    /// Obligations.
    #[serde(default)]
    pub obligations: Vec<Obligation>,
}

/// Authorization decision statement carried in an assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LxacmlAuthzDecisionStatement {
    /// Echo of the request that was evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<LxacmlRequest>,
    /// The result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<LxacmlResult>,
}
