//! Wire protocol model.
//!
//! The types here describe the documents exchanged between enforcement and
//! decision points. Rendering them to signed XML is the job of a
//! [`DocumentCodec`](crate::codec::DocumentCodec).
//!
//! - [`saml`] - envelope types: headers, statuses, subjects, assertions
//! - [`lxacml`] - authorization requests, results and obligations
//! - [`cache`] - cache clearing requests and responses

pub mod cache;
pub mod lxacml;
pub mod saml;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

pub use cache::{ClearAuthzCacheRequest, ClearAuthzCacheResponse, ExtensionElement, Extensions};
pub use lxacml::{
    AssignmentContent, Attribute, AttributeAssignment, AttributeValue, AuthzDecisionQuery,
    DecisionType, Effect, LxacmlAuthzDecisionStatement, LxacmlRequest, LxacmlResult,
    LxacmlStatus, Obligation,
};
pub use saml::{
    Assertion, AudienceRestriction, BEARER_METHOD, Conditions, NameId, RequestHeader, Response,
    SAML_VERSION, Statement, Status, StatusCode, Subject, SubjectConfirmation,
    SubjectConfirmationData,
};

/// Any document exchanged by this protocol profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "document")]
pub enum ProtocolDocument {
    /// Enforcement point to decision point query.
    AuthzDecisionQuery(AuthzDecisionQuery),
    /// Decision point response.
    Response(Response),
    /// Decision point to enforcement point cache clear.
    ClearAuthzCacheRequest(ClearAuthzCacheRequest),
    /// Enforcement point acknowledgement of a cache clear.
    ClearAuthzCacheResponse(ClearAuthzCacheResponse),
}

impl ProtocolDocument {
    /// Element name of the document.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolDocument::AuthzDecisionQuery(_) => "AuthzDecisionQuery",
            ProtocolDocument::Response(_) => "Response",
            ProtocolDocument::ClearAuthzCacheRequest(_) => "ClearAuthzCacheRequest",
            ProtocolDocument::ClearAuthzCacheResponse(_) => "ClearAuthzCacheResponse",
        }
    }

    /// Take the document as a decision query.
    pub fn into_authz_decision_query(self) -> Result<AuthzDecisionQuery, CodecError> {
        match self {
            ProtocolDocument::AuthzDecisionQuery(query) => Ok(query),
            other => Err(other.unexpected("AuthzDecisionQuery")),
        }
    }

    /// Take the document as a response.
    pub fn into_response(self) -> Result<Response, CodecError> {
        match self {
            ProtocolDocument::Response(response) => Ok(response),
            other => Err(other.unexpected("Response")),
        }
    }

    /// Take the document as a cache clear request.
    pub fn into_clear_authz_cache_request(self) -> Result<ClearAuthzCacheRequest, CodecError> {
        match self {
            ProtocolDocument::ClearAuthzCacheRequest(request) => Ok(request),
            other => Err(other.unexpected("ClearAuthzCacheRequest")),
        }
    }

    /// Take the document as a cache clear response.
    pub fn into_clear_authz_cache_response(self) -> Result<ClearAuthzCacheResponse, CodecError> {
        match self {
            ProtocolDocument::ClearAuthzCacheResponse(response) => Ok(response),
            other => Err(other.unexpected("ClearAuthzCacheResponse")),
        }
    }

    fn unexpected(&self, expected: &'static str) -> CodecError {
        CodecError::UnexpectedDocument {
            expected,
            found: self.kind(),
        }
    }
}

impl From<AuthzDecisionQuery> for ProtocolDocument {
    fn from(value: AuthzDecisionQuery) -> Self {
        ProtocolDocument::AuthzDecisionQuery(value)
    }
}

impl From<Response> for ProtocolDocument {
    fn from(value: Response) -> Self {
        ProtocolDocument::Response(value)
    }
}

impl From<ClearAuthzCacheRequest> for ProtocolDocument {
    fn from(value: ClearAuthzCacheRequest) -> Self {
        ProtocolDocument::ClearAuthzCacheRequest(value)
    }
}

impl From<ClearAuthzCacheResponse> for ProtocolDocument {
    fn from(value: ClearAuthzCacheResponse) -> Self {
        ProtocolDocument::ClearAuthzCacheResponse(value)
    }
}
