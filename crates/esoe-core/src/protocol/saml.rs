//! SAML protocol envelope types.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::lxacml::LxacmlAuthzDecisionStatement;

/// Protocol version carried by every request and response.
pub const SAML_VERSION: &str = "2.0";

/// Subject confirmation method for bearer assertions.
pub const BEARER_METHOD: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

// =============================================================================
// Status
// =============================================================================

/// Top-level status codes used by this protocol profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusCode {
    /// The request was processed.
    Success,
    /// The request was malformed, unsigned or otherwise invalid.
    Requester,
    /// The responder failed while processing a valid request.
    Responder,
    /// The principal or session could not be validated.
    AuthnFailed,
}

impl StatusCode {
    /// The SAML status URN for this code.
    #[must_use]
    pub fn urn(&self) -> &'static str {
        match self {
            StatusCode::Success => "urn:oasis:names:tc:SAML:2.0:status:Success",
            StatusCode::Requester => "urn:oasis:names:tc:SAML:2.0:status:Requester",
            StatusCode::Responder => "urn:oasis:names:tc:SAML:2.0:status:Responder",
            StatusCode::AuthnFailed => "urn:oasis:names:tc:SAML:2.0:status:AuthnFailed",
        }
    }
}

/// Response status with an optional human readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Status code.
    pub code: StatusCode,
    /// Optional status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    /// A success status without a message.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success,
            message: None,
        }
    }

    /// A requester failure with a message.
    #[must_use]
    pub fn requester(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Requester,
            message: Some(message.into()),
        }
    }

    /// An authentication failure with a message.
    #[must_use]
    pub fn authn_failed(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::AuthnFailed,
            message: Some(message.into()),
        }
    }

    /// Attach a message to this status.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns true if the status code is `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }
}

// =============================================================================
// Identifiers and headers
// =============================================================================

/// A SAML name identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The identifier value.
    pub value: String,
    /// Optional name identifier format URN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl NameId {
    /// Create a name identifier without a format.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
        }
    }
}

/// Fields common to every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Unique request identifier.
    pub id: String,
    /// Protocol version.
    pub version: String,
    /// When the request was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issue_instant: OffsetDateTime,
    /// The issuing entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<NameId>,
    /// Intended recipient endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl RequestHeader {
    /// Create a header for a request issued now by `issuer`.
    #[must_use]
    pub fn new(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: SAML_VERSION.to_string(),
            issue_instant: OffsetDateTime::now_utc(),
            issuer: Some(NameId::new(issuer)),
            destination: None,
        }
    }

    /// The issuer's entity identifier, if present.
    #[must_use]
    pub fn issuer_id(&self) -> Option<&str> {
        self.issuer.as_ref().map(|n| n.value.as_str())
    }
}

// =============================================================================
// Subjects and conditions
// =============================================================================

/// The subject of an assertion or request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Name identifier of the subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,
    /// Subject confirmations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    /// A subject identified only by name.
    #[must_use]
    pub fn named(value: impl Into<String>) -> Self {
        Self {
            name_id: Some(NameId::new(value)),
            confirmations: Vec::new(),
        }
    }
}

/// A subject confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// Confirmation method URN.
    pub method: String,
    /// Confirmation data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SubjectConfirmationData>,
}

/// Constraints under which a subject confirmation holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// Confirmation is void at or after this instant.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub not_on_or_after: Option<OffsetDateTime>,
    /// Request the assertion answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
    /// Intended recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

/// Assertion validity conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Assertion is void at or after this instant.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub not_on_or_after: Option<OffsetDateTime>,
    /// Audiences the assertion is restricted to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience_restrictions: Vec<AudienceRestriction>,
}

/// Restriction of an assertion to a set of audiences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// Entity identifiers allowed to consume the assertion.
    pub audiences: Vec<String>,
}

// =============================================================================
// Assertions and responses
// =============================================================================

/// Statements an assertion may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Statement {
    /// An LXACML authorization decision.
    LxacmlAuthzDecision(LxacmlAuthzDecisionStatement),
    /// Any statement this profile does not interpret.
    Other {
        /// Element name of the statement.
        name: String,
    },
}

/// A SAML assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Assertion identifier.
    pub id: String,
    /// Protocol version.
    pub version: String,
    /// When the assertion was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issue_instant: OffsetDateTime,
    /// Asserting party.
    pub issuer: NameId,
    /// Assertion subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    /// Validity conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,
    /// Statements.
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl Assertion {
    /// The first LXACML authorization decision statement, if any.
    #[must_use]
    pub fn authz_decision_statement(&self) -> Option<&LxacmlAuthzDecisionStatement> {
        self.statements.iter().find_map(|statement| match statement {
            Statement::LxacmlAuthzDecision(s) => Some(s),
            Statement::Other { .. } => None,
        })
    }
}

/// A SAML protocol response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
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
    /// Assertions; empty unless the status is success.
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}
