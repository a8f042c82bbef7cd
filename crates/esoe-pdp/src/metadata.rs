//! Enforcement point metadata.
//!
//! Resolves where each enforcement point accepts cache clear requests.
//! Refreshing metadata from its published source is left to the
//! implementation.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::error::MetadataError;

/// Cache clear endpoints of one enforcement point, keyed by endpoint index.
pub type CacheClearEndpoints = IndexMap<u32, String>;

/// Lookup of enforcement point cache clear services.
pub trait SpepMetadata: Send + Sync {
    /// Cache clear endpoints registered for `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::UnknownEntity`] when the entity has no cache
    /// clear service.
    fn cache_clear_endpoints(&self, entity_id: &str) -> Result<CacheClearEndpoints, MetadataError>;

    /// A single endpoint by index.
    ///
    /// # Errors
    ///
    /// Returns an error when the entity or the index is unknown.
    fn cache_clear_endpoint(&self, entity_id: &str, index: u32) -> Result<String, MetadataError> {
        self.cache_clear_endpoints(entity_id)?
            .swap_remove(&index)
            .ok_or_else(|| MetadataError::UnknownEndpoint {
                entity_id: entity_id.to_string(),
                index,
            })
    }
}

/// Metadata held in memory, e.g. loaded once from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    endpoints: HashMap<String, CacheClearEndpoints>,
}

impl StaticMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache clear endpoint.
    #[must_use]
    pub fn with_endpoint(
        mut self,
        entity_id: impl Into<String>,
        index: u32,
        endpoint: impl Into<String>,
    ) -> Self {
        self.endpoints
            .entry(entity_id.into())
            .or_default()
            .insert(index, endpoint.into());
        self
    }
}

impl SpepMetadata for StaticMetadata {
    fn cache_clear_endpoints(&self, entity_id: &str) -> Result<CacheClearEndpoints, MetadataError> {
        self.endpoints
            .get(entity_id)
            .cloned()
            .ok_or_else(|| MetadataError::UnknownEntity {
                entity_id: entity_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_metadata_lookup() {
        let metadata = StaticMetadata::new()
            .with_endpoint("spep-a", 0, "https://a.example.com/clear")
            .with_endpoint("spep-a", 1, "https://a2.example.com/clear");

        assert_eq!(metadata.cache_clear_endpoints("spep-a").map(|e| e.len()), Ok(2));
        assert_eq!(
            metadata.cache_clear_endpoint("spep-a", 1).as_deref(),
            Ok("https://a2.example.com/clear")
        );
        assert_eq!(
            metadata.cache_clear_endpoint("spep-a", 7),
            Err(MetadataError::UnknownEndpoint {
                entity_id: "spep-a".to_string(),
                index: 7
            })
        );
        assert!(matches!(
            metadata.cache_clear_endpoints("spep-b"),
            Err(MetadataError::UnknownEntity { .. })
        ));
    }
}
