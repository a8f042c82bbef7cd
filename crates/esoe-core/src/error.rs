//! Error types shared by the enforcement and decision sides.
//!
//! Each collaborator seam has its own error enum so that callers can map
//! failures onto protocol status codes or decisions precisely.

/// Errors raised while signing, verifying or (un)marshalling documents.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The document signature did not verify.
    #[error("Signature invalid: {message}")]
    SignatureInvalid {
        /// Description of the signature failure.
        message: String,
    },

    /// A signature reference did not resolve to the signed element.
    #[error("Reference invalid: {message}")]
    ReferenceInvalid {
        /// Description of the reference failure.
        message: String,
    },

    /// The document could not be parsed or failed schema validation.
    #[error("Unmarshal failed: {message}")]
    Unmarshal {
        /// Description of the parse failure.
        message: String,
    },

    /// The document could not be rendered or signed.
    #[error("Marshal failed: {message}")]
    Marshal {
        /// Description of the marshal failure.
        message: String,
    },

    /// A well-formed document of the wrong kind was received.
    #[error("Unexpected document: expected {expected}, found {found}")]
    UnexpectedDocument {
        /// Kind of document the caller needed.
        expected: &'static str,
        /// Kind of document that arrived.
        found: &'static str,
    },
}

impl CodecError {
    /// Creates a new `SignatureInvalid` error.
    #[must_use]
    pub fn signature_invalid(message: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            message: message.into(),
        }
    }

    /// Creates a new `ReferenceInvalid` error.
    #[must_use]
    pub fn reference_invalid(message: impl Into<String>) -> Self {
        Self::ReferenceInvalid {
            message: message.into(),
        }
    }

    /// Creates a new `Unmarshal` error.
    #[must_use]
    pub fn unmarshal(message: impl Into<String>) -> Self {
        Self::Unmarshal {
            message: message.into(),
        }
    }

    /// Creates a new `Marshal` error.
    #[must_use]
    pub fn marshal(message: impl Into<String>) -> Self {
        Self::Marshal {
            message: message.into(),
        }
    }
}

/// Errors raised by the web-service transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint could not be reached.
    #[error("Connection to {endpoint} failed: {message}")]
    Connect {
        /// Endpoint that was called.
        endpoint: String,
        /// Description of the failure.
        message: String,
    },

    /// The endpoint answered with a non-success status.
    #[error("Endpoint {endpoint} returned status {status}")]
    Status {
        /// Endpoint that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// The call did not complete in time.
    #[error("Request to {endpoint} timed out")]
    Timeout {
        /// Endpoint that was called.
        endpoint: String,
    },

    /// The response body could not be read.
    #[error("Failed to read response from {endpoint}: {message}")]
    Body {
        /// Endpoint that was called.
        endpoint: String,
        /// Description of the failure.
        message: String,
    },
}

impl TransportError {
    /// Creates a new `Connect` error.
    #[must_use]
    pub fn connect(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while validating a protocol request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required element or attribute is absent.
    #[error("Missing element: {element}")]
    MissingElement {
        /// Name of the missing element.
        element: String,
    },

    /// The protocol version is not supported.
    #[error("Unsupported version: {version}")]
    UnsupportedVersion {
        /// The version that was presented.
        version: String,
    },

    /// The issue instant lies outside the allowed clock skew.
    #[error("Issue instant outside allowed clock skew: {message}")]
    IssueInstant {
        /// Description of the skew violation.
        message: String,
    },
}

impl ValidationError {
    /// Creates a new `MissingElement` error.
    #[must_use]
    pub fn missing(element: impl Into<String>) -> Self {
        Self::MissingElement {
            element: element.into(),
        }
    }
}
