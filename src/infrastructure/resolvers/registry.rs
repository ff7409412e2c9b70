//! Resolver that dispatches on the kind of source.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{FileResolver, StreamResolver};
use crate::domain::entities::{ImageSource, SourceKind};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ResolvedImage, SourceResolver};

/// Routes each source to the resolver registered for its kind.
///
/// Files and streams are handled out of the box; URL, bundle and resource
/// resolvers must be registered.
#[derive(Clone)]
pub struct ResolverRegistry {
    file: Arc<dyn SourceResolver>,
    url: Option<Arc<dyn SourceResolver>>,
    bundle: Option<Arc<dyn SourceResolver>>,
    resource: Option<Arc<dyn SourceResolver>>,
    stream: Arc<dyn SourceResolver>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self {
            file: Arc::new(FileResolver),
            url: None,
            bundle: None,
            resource: None,
            stream: Arc::new(StreamResolver),
        }
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("url", &self.url.is_some())
            .field("bundle", &self.bundle.is_some())
            .field("resource", &self.resource.is_some())
            .finish_non_exhaustive()
    }
}

impl ResolverRegistry {
    /// Creates a registry with file and stream support only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the resolver for `kind`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, kind: SourceKind, resolver: Arc<dyn SourceResolver>) -> Self {
        match kind {
            SourceKind::FilePath => self.file = resolver,
            SourceKind::Url => self.url = Some(resolver),
            SourceKind::ApplicationBundle => self.bundle = Some(resolver),
            SourceKind::CompiledResource => self.resource = Some(resolver),
            SourceKind::Stream => self.stream = resolver,
        }
        self
    }

    fn resolver_for(&self, kind: SourceKind) -> Option<&Arc<dyn SourceResolver>> {
        match kind {
            SourceKind::FilePath => Some(&self.file),
            SourceKind::Url => self.url.as_ref(),
            SourceKind::ApplicationBundle => self.bundle.as_ref(),
            SourceKind::CompiledResource => self.resource.as_ref(),
            SourceKind::Stream => Some(&self.stream),
        }
    }
}

#[async_trait]
impl SourceResolver for ResolverRegistry {
    async fn resolve(
        &self,
        source: &ImageSource,
        token: &CancellationToken,
    ) -> Result<ResolvedImage, LoadError> {
        let kind = source.kind();
        let resolver = self
            .resolver_for(kind)
            .ok_or_else(|| LoadError::resolution(format!("no resolver registered for {kind}")))?;
        resolver.resolve(source, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::MockResolver;

    #[tokio::test]
    async fn test_routes_by_kind() {
        let mock = Arc::new(MockResolver::new(4, 4));
        let registry = ResolverRegistry::new().with(SourceKind::Url, mock.clone());
        let token = CancellationToken::new();

        registry
            .resolve(&ImageSource::Url("https://example.com/a.png".into()), &token)
            .await
            .unwrap();
        assert_eq!(mock.calls(), 1);

        let err = registry
            .resolve(&ImageSource::Bundle("a.png".into()), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::ResolutionFailed { .. }));
    }
}
