//! Error types for the decision point.

use esoe_core::{CodecError, TransportError};
use std::fmt;

/// Why an authorization query was refused before any policy was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The request was absent or failed header validation.
    InvalidRequest,
    /// The request signature did not verify.
    SignatureInvalid,
    /// A signature reference did not resolve.
    ReferenceInvalid,
    /// The request could not be parsed.
    Unmarshal,
    /// The subject's session is unknown to the identity provider.
    SessionUnknown,
}

impl RejectionReason {
    /// Short name used in logs and messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid-request",
            Self::SignatureInvalid => "signature-invalid",
            Self::ReferenceInvalid => "reference-invalid",
            Self::Unmarshal => "unmarshal",
            Self::SessionUnknown => "session-unknown",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&CodecError> for RejectionReason {
    fn from(error: &CodecError) -> Self {
        match error {
            CodecError::SignatureInvalid { .. } => Self::SignatureInvalid,
            CodecError::ReferenceInvalid { .. } => Self::ReferenceInvalid,
            CodecError::Unmarshal { .. } | CodecError::Marshal { .. } => Self::Unmarshal,
            CodecError::UnexpectedDocument { .. } => Self::InvalidRequest,
        }
    }
}

/// An authorization query that was refused.
///
/// Carries the `authnFailed` response document that should still be handed
/// back to the enforcement point, when one could be rendered.
#[derive(Debug, thiserror::Error)]
#[error("Authorization request rejected ({reason}): {message}")]
pub struct RequestRejected {
    /// Category of the rejection.
    pub reason: RejectionReason,
    /// Description of the failure.
    pub message: String,
    /// The response to return to the caller.
    pub response_document: Option<Vec<u8>>,
}

impl RequestRejected {
    /// Creates a rejection without a response document.
    #[must_use]
    pub fn new(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            response_document: None,
        }
    }

    /// Attach the rendered response.
    #[must_use]
    pub fn with_response(mut self, document: Option<Vec<u8>>) -> Self {
        self.response_document = document;
        self
    }
}

/// Errors raised by the identity provider session lookup.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session backend failed.
    #[error("Session lookup failed: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl SessionError {
    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Errors raised while evaluating a rule condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    /// The condition expression is not understood.
    #[error("Invalid condition: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

impl ConditionError {
    /// Creates a new `Invalid` error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Errors raised by the policy source.
#[derive(Debug, thiserror::Error)]
pub enum PolicySourceError {
    /// The policy store could not be read.
    #[error("Policy source unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The policy store holds no usable sequence id.
    #[error("Policy source returned invalid sequence id {sequence_id}")]
    InvalidSequence {
        /// The sequence id that was returned.
        sequence_id: i64,
    },

    /// The policy store returned no policies for a rebuild.
    #[error("Policy source returned no policies")]
    Empty,
}

impl PolicySourceError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Errors raised while resolving enforcement point metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// No cache clear service is registered for the entity.
    #[error("No cache clear service registered for {entity_id}")]
    UnknownEntity {
        /// Entity identifier of the enforcement point.
        entity_id: String,
    },

    /// The entity has no cache clear endpoint at the given index.
    #[error("No cache clear endpoint {index} registered for {entity_id}")]
    UnknownEndpoint {
        /// Entity identifier of the enforcement point.
        entity_id: String,
        /// Requested endpoint index.
        index: u32,
    },
}

/// Decision point errors.
#[derive(Debug, thiserror::Error)]
pub enum PdpError {
    /// An authorization query was refused.
    #[error(transparent)]
    Rejected(#[from] RequestRejected),

    /// A document could not be rendered or parsed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A remote endpoint could not be called.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Enforcement point metadata was incomplete.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The policy source failed.
    #[error(transparent)]
    PolicySource(#[from] PolicySourceError),

    /// An enforcement point refused a cache clear request.
    #[error("Cache clear refused by {endpoint}: {message}")]
    CacheClearRefused {
        /// Endpoint that answered.
        endpoint: String,
        /// Status message returned.
        message: String,
    },

    /// Nothing is known about the entity's policies.
    #[error("No policies loaded for {entity_id}")]
    NoPolicies {
        /// Entity identifier of the enforcement point.
        entity_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_reason_from_codec_error() {
        assert_eq!(
            RejectionReason::from(&CodecError::signature_invalid("bad")),
            RejectionReason::SignatureInvalid
        );
        assert_eq!(
            RejectionReason::from(&CodecError::reference_invalid("bad")),
            RejectionReason::ReferenceInvalid
        );
        assert_eq!(
            RejectionReason::from(&CodecError::unmarshal("bad")),
            RejectionReason::Unmarshal
        );
    }

    #[test]
    fn test_request_rejected_display() {
        let err = RequestRejected::new(RejectionReason::SessionUnknown, "no session for abc");
        assert_eq!(
            err.to_string(),
            "Authorization request rejected (session-unknown): no session for abc"
        );
        assert!(err.response_document.is_none());
    }
}
