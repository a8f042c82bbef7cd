//! Enforcement point error types.

use esoe_core::{CodecError, Decision, TransportError, ValidationError};

/// Errors raised by the decision cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The cache was used before a group target map was installed.
    #[error("Decision cache is not initialized: no group target map has been installed")]
    Uninitialized,
}

/// Errors raised by a session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The backing store failed.
    #[error("Session store error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

impl SessionError {
    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// Reasons an authorization query to the decision point failed.
#[derive(Debug, thiserror::Error)]
pub enum EnforcementError {
    /// The response signature did not verify.
    #[error("Signature invalid: {message}")]
    SignatureInvalid {
        /// Description of the failure.
        message: String,
    },

    /// A signature reference did not resolve.
    #[error("Reference invalid: {message}")]
    ReferenceInvalid {
        /// Description of the failure.
        message: String,
    },

    /// A document could not be produced or parsed.
    #[error("Unmarshal failed: {message}")]
    UnmarshalFailed {
        /// Description of the failure.
        message: String,
    },

    /// The decision point could not be reached.
    #[error("Transport failed: {0}")]
    TransportFailed(#[from] TransportError),

    /// The decision point does not know the principal's session.
    #[error("Session unknown to decision point: {message}")]
    SessionUnknown {
        /// Status message from the decision point.
        message: String,
    },

    /// The decision point rejected the query.
    #[error("Query rejected by decision point: {message}")]
    Rejected {
        /// Status message from the decision point.
        message: String,
    },

    /// The response lacks a required element.
    #[error("Malformed assertion: {message}")]
    MalformedAssertion {
        /// Description of what is missing or inconsistent.
        message: String,
    },

    /// The subject confirmation is no longer valid.
    #[error("Assertion expired at {not_on_or_after}")]
    Expired {
        /// When the confirmation expired.
        not_on_or_after: time::OffsetDateTime,
    },

    /// The local session could not be resolved.
    #[error("Unknown local session")]
    UnknownLocalSession,

    /// The local session store failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The cache refused to answer.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl EnforcementError {
    /// Creates a new `MalformedAssertion` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedAssertion {
            message: message.into(),
        }
    }

    /// The decision reported to the caller for this failure.
    ///
    /// Only an unknown remote session yields `Deny`; every other failure is
    /// an `Error`.
    #[must_use]
    pub fn decision(&self) -> Decision {
        match self {
            EnforcementError::SessionUnknown { .. } => Decision::Deny,
            _ => Decision::Error,
        }
    }
}

impl From<CodecError> for EnforcementError {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::SignatureInvalid { message } => Self::SignatureInvalid { message },
            CodecError::ReferenceInvalid { message } => Self::ReferenceInvalid { message },
            CodecError::Unmarshal { message } | CodecError::Marshal { message } => {
                Self::UnmarshalFailed { message }
            }
            other @ CodecError::UnexpectedDocument { .. } => Self::UnmarshalFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<ValidationError> for EnforcementError {
    fn from(value: ValidationError) -> Self {
        Self::malformed(value.to_string())
    }
}
