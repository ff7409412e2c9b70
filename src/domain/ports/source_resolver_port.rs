//! Source resolver port definition.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::domain::entities::{ImageSource, LoadingResult};
use crate::domain::errors::LoadError;

/// Payload produced by a resolver.
#[derive(Debug, Clone)]
pub enum ResolvedData {
    /// Encoded bytes that still need decoding.
    Bytes(Bytes),
    /// An already decoded image.
    Image(Arc<image::DynamicImage>),
}

/// Output of a successful resolve.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    /// The resolved payload.
    pub data: ResolvedData,
    /// Canonical identifier of what was read (path, final URL, resource name).
    pub resolved_key: String,
    /// Where the payload came from.
    pub result: LoadingResult,
}

impl ResolvedImage {
    /// Creates a bytes payload.
    #[must_use]
    pub fn bytes(bytes: Bytes, resolved_key: impl Into<String>, result: LoadingResult) -> Self {
        Self {
            data: ResolvedData::Bytes(bytes),
            resolved_key: resolved_key.into(),
            result,
        }
    }
}

/// Port that turns an image source into bytes or a decoded image.
///
/// Must be safe to call concurrently for different sources and should
/// return [`LoadError::Cancelled`] promptly once `token` fires.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Resolves `source`.
    async fn resolve(
        &self,
        source: &ImageSource,
        token: &CancellationToken,
    ) -> Result<ResolvedImage, LoadError>;
}
