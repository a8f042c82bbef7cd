//! Protocol header validation.

use std::time::Duration;
use time::OffsetDateTime;

use crate::error::ValidationError;
use crate::protocol::{RequestHeader, SAML_VERSION};

/// Validates the common fields of incoming requests.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    allowed_clock_skew: Duration,
}

impl RequestValidator {
    /// Create a validator tolerating the given clock skew.
    #[must_use]
    pub fn new(allowed_clock_skew: Duration) -> Self {
        Self { allowed_clock_skew }
    }

    /// Validate a request header against the current time.
    pub fn validate(&self, header: &RequestHeader) -> Result<(), ValidationError> {
        self.validate_at(header, OffsetDateTime::now_utc())
    }

    /// Validate a request header against `now`.
    pub fn validate_at(
        &self,
        header: &RequestHeader,
        now: OffsetDateTime,
    ) -> Result<(), ValidationError> {
        if header.id.is_empty() {
            return Err(ValidationError::missing("ID"));
        }

        if header.version != SAML_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                version: header.version.clone(),
            });
        }

        match header.issuer_id() {
            Some(issuer) if !issuer.is_empty() => {}
            _ => return Err(ValidationError::missing("Issuer")),
        }

        if header.issue_instant > now + self.allowed_clock_skew {
            return Err(ValidationError::IssueInstant {
                message: format!("{} is in the future", header.issue_instant),
            });
        }

        if header.issue_instant < now - self.allowed_clock_skew {
            return Err(ValidationError::IssueInstant {
                message: format!("{} is too old", header.issue_instant),
            });
        }

        Ok(())
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
