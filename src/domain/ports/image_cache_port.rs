//! Port definitions for the decoded image and download caches.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::domain::entities::{CacheKey, CachedImage, ImageInformation};

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// Entry not found in cache.
    #[error("Entry not found: {0}")]
    NotFound(String),
    /// Stored entry could not be parsed.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// Network setup error.
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Port for the in-memory cache of decoded images.
/// Implementations must be thread-safe.
#[async_trait::async_trait]
pub trait ImageCachePort: Send + Sync {
    /// Looks up an image, refreshing its recency.
    /// Returns None if not cached.
    async fn get(&self, key: &CacheKey) -> Option<CachedImage>;

    /// Stores an image, replacing any entry under the same key.
    async fn add(&self, key: CacheKey, image: Arc<image::DynamicImage>, info: ImageInformation);

    /// Removes an image from the cache.
    async fn invalidate(&self, key: &CacheKey);

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all images from the cache.
    async fn clear(&self);
}

/// Port for the persistent cache of downloaded bytes.
#[async_trait::async_trait]
pub trait DownloadCachePort: Send + Sync {
    /// Returns the bytes stored for `url`, or None if absent or expired.
    async fn get(&self, url: &str) -> Option<Bytes>;

    /// Stores bytes for `url`. `ttl` of None means the entry never expires.
    async fn put(&self, url: &str, bytes: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Removes the entry for `url`.
    async fn remove(&self, url: &str);

    /// Removes every entry.
    async fn clear(&self) -> CacheResult<()>;
}
