//! Resolver for assets shipped next to the application.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::file::read_file;
use crate::domain::entities::{ImageSource, LoadingResult};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ResolvedImage, SourceResolver};

/// Reads [`ImageSource::Bundle`] paths relative to a root directory.
#[derive(Debug, Clone)]
pub struct BundleResolver {
    root: PathBuf,
}

impl BundleResolver {
    /// Creates a resolver rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Maps a bundle path to a file under the root.
    /// Absolute paths and `..` components are rejected.
    fn locate(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative.trim_start_matches(['/', '\\']));
        let mut out = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        (out != self.root).then_some(out)
    }
}

#[async_trait]
impl SourceResolver for BundleResolver {
    async fn resolve(
        &self,
        source: &ImageSource,
        token: &CancellationToken,
    ) -> Result<ResolvedImage, LoadError> {
        let ImageSource::Bundle(path) = source else {
            return Err(LoadError::resolution(format!(
                "bundle resolver cannot read {source:?}"
            )));
        };
        let full = self.locate(path).ok_or_else(|| LoadError::not_found(path.clone()))?;
        let bytes = read_file(&full, token).await?;
        Ok(ResolvedImage::bytes(
            bytes,
            full.display().to_string(),
            LoadingResult::ApplicationBundle,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("icons/a.png", true ; "nested")]
    #[test_case("/icons/a.png", true ; "leading_slash")]
    #[test_case("./a.png", true ; "current_dir")]
    #[test_case("../secret.png", false ; "parent_escape")]
    #[test_case("icons/../../secret.png", false ; "nested_escape")]
    #[test_case("", false ; "empty")]
    fn test_locate(path: &str, allowed: bool) {
        let resolver = BundleResolver::new("/app/assets");
        let located = resolver.locate(path);
        assert_eq!(located.is_some(), allowed);
        if let Some(p) = located {
            assert!(p.starts_with("/app/assets"));
        }
    }

    #[tokio::test]
    async fn test_reads_bundle_asset() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("icons")).unwrap();
        std::fs::write(dir.path().join("icons/a.png"), b"icon").unwrap();
        let resolver = BundleResolver::new(dir.path());

        let resolved = resolver
            .resolve(
                &ImageSource::Bundle("icons/a.png".into()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(resolved.result, LoadingResult::ApplicationBundle);
    }

    #[tokio::test]
    async fn test_escape_is_not_found() {
        let resolver = BundleResolver::new("/app/assets");
        let err = resolver
            .resolve(
                &ImageSource::Bundle("../etc/passwd".into()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
    }
}
