//! Local file system resolver.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::domain::entities::{ImageSource, LoadingResult};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ResolvedImage, SourceResolver};

/// Reads [`ImageSource::File`] paths with tokio's file system API.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResolver;

/// Reads a file, mapping a missing file to [`LoadError::NotFound`].
pub(super) async fn read_file(
    path: &std::path::Path,
    token: &CancellationToken,
) -> Result<Bytes, LoadError> {
    let read = tokio::select! {
        () = token.cancelled() => return Err(LoadError::Cancelled),
        read = tokio::fs::read(path) => read,
    };
    match read {
        Ok(data) => Ok(Bytes::from(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(LoadError::not_found(path.display().to_string()))
        }
        Err(e) => Err(LoadError::resolution(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}

#[async_trait]
impl SourceResolver for FileResolver {
    async fn resolve(
        &self,
        source: &ImageSource,
        token: &CancellationToken,
    ) -> Result<ResolvedImage, LoadError> {
        let ImageSource::File(path) = source else {
            return Err(LoadError::resolution(format!(
                "file resolver cannot read {source:?}"
            )));
        };
        let bytes = read_file(std::path::Path::new(path), token).await?;
        trace!(path = %path, size = bytes.len(), "Read image file");
        Ok(ResolvedImage::bytes(bytes, path.clone(), LoadingResult::Filepath))
    }
}
