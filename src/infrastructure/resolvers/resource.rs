//! Catalog of named, in-memory resources.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::domain::entities::{ImageSource, LoadingResult};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ResolvedImage, SourceResolver};

/// Serves [`ImageSource::CompiledResource`] names from registered bytes,
/// typically filled from `include_bytes!` at startup.
#[derive(Debug, Default)]
pub struct ResourceCatalog {
    resources: RwLock<HashMap<String, Bytes>>,
}

impl ResourceCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bytes` under `name`, replacing any previous resource.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Bytes>) {
        self.resources.write().insert(name.into(), bytes.into());
    }

    /// Removes a resource. Returns true if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.resources.write().remove(name).is_some()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resources.read().contains_key(name)
    }
}

#[async_trait]
impl SourceResolver for ResourceCatalog {
    async fn resolve(
        &self,
        source: &ImageSource,
        _token: &CancellationToken,
    ) -> Result<ResolvedImage, LoadError> {
        let ImageSource::CompiledResource(name) = source else {
            return Err(LoadError::resolution(format!(
                "resource catalog cannot read {source:?}"
            )));
        };
        let bytes = self
            .resources
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::not_found(name.clone()))?;
        Ok(ResolvedImage::bytes(
            bytes,
            name.clone(),
            LoadingResult::CompiledResource,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_and_missing() {
        let catalog = ResourceCatalog::new();
        catalog.insert("logo", Bytes::from_static(b"logo"));
        let token = CancellationToken::new();

        let found = catalog
            .resolve(&ImageSource::CompiledResource("logo".into()), &token)
            .await
            .unwrap();
        assert_eq!(found.resolved_key, "logo");

        let err = catalog
            .resolve(&ImageSource::CompiledResource("nope".into()), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));

        assert!(catalog.remove("logo"));
        assert!(!catalog.contains("logo"));
    }
}
