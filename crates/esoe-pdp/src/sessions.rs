//! Identity provider session lookup.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::SessionError;

/// Attribute name to values, as released for a principal.
pub type PrincipalAttributes = HashMap<String, Vec<String>>;

/// An authenticated principal known to the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// SAML session identifier the enforcement point knows the principal by.
    pub session_id: String,
    /// Authenticated principal name, if released.
    pub principal_name: Option<String>,
    /// Principal attributes used by rule conditions.
    pub attributes: PrincipalAttributes,
}

impl Principal {
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Add an attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }
}

/// Session store of the identity provider.
#[async_trait]
pub trait SessionQuery: Send + Sync {
    /// Resolve a SAML session identifier to its principal.
    ///
    /// Returns `Ok(None)` when no such session exists.
    async fn query_saml_session(&self, session_id: &str) -> Result<Option<Principal>, SessionError>;
}
