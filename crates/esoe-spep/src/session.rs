//! Principal sessions as seen by the enforcement point.
//!
//! Sessions are owned by an external store. The decision cache only uses
//! a session's ESOE session identifier as its key.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::SessionError;

/// An authenticated principal known to this enforcement point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalSession {
    /// Session identifier issued by the identity provider.
    pub esoe_session_id: String,

    /// Expiry of the session, if bounded.
    pub expires_at: Option<OffsetDateTime>,
}

impl PrincipalSession {
    /// Create an unbounded session.
    #[must_use]
    pub fn new(esoe_session_id: impl Into<String>) -> Self {
        Self {
            esoe_session_id: esoe_session_id.into(),
            expires_at: None,
        }
    }

    /// Set the expiry of the session.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: OffsetDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Key under which the decision cache stores this principal.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.esoe_session_id
    }

    /// Whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }
}

/// Storage of principal sessions for the enforcement point.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve a local session identifier to a principal session.
    ///
    /// Returns `Ok(None)` if the session does not exist.
    async fn principal_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PrincipalSession>, SessionError>;

    /// Terminate a principal's session locally.
    async fn terminate(&self, session: &PrincipalSession) -> Result<(), SessionError>;
}
