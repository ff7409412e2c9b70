//! Domain types describing decoded images.

use std::sync::Arc;

use super::cache_key::CacheKey;
use super::request::SourceKind;

/// Where a delivered image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadingResult {
    /// Decoded image found in the memory cache.
    MemoryCache,
    /// Raw bytes found in the disk cache.
    DiskCache,
    /// Downloaded from the network.
    Internet,
    /// Read from the local file system.
    Filepath,
    /// Read from the application bundle.
    ApplicationBundle,
    /// Read from the compiled resource catalog.
    CompiledResource,
    /// Produced by a caller supplied stream.
    Stream,
}

impl LoadingResult {
    /// Returns true if the image did not need a network round trip.
    #[must_use]
    pub const fn is_local_or_cached(self) -> bool {
        !matches!(self, Self::Internet)
    }
}

impl std::fmt::Display for LoadingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Internet => write!(f, "internet"),
            Self::Filepath => write!(f, "file"),
            Self::ApplicationBundle => write!(f, "bundle"),
            Self::CompiledResource => write!(f, "resource"),
            Self::Stream => write!(f, "stream"),
        }
    }
}

/// Metadata carried alongside a decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInformation {
    /// Cache key the image is stored under.
    pub key: CacheKey,
    /// Width of the source before downsampling.
    pub original_width: u32,
    /// Height of the source before downsampling.
    pub original_height: u32,
    /// Width of the delivered buffer.
    pub current_width: u32,
    /// Height of the delivered buffer.
    pub current_height: u32,
    /// Kind of source the image was requested from.
    pub source_kind: SourceKind,
    /// Resolved path of the source, if it has one.
    pub file_path: Option<String>,
}

impl ImageInformation {
    /// Creates information for an image whose dimensions are not yet known.
    #[must_use]
    pub const fn new(key: CacheKey, source_kind: SourceKind) -> Self {
        Self {
            key,
            original_width: 0,
            original_height: 0,
            current_width: 0,
            current_height: 0,
            source_kind,
            file_path: None,
        }
    }

    /// Sets the source dimensions.
    #[must_use]
    pub const fn with_original_size(mut self, width: u32, height: u32) -> Self {
        self.original_width = width;
        self.original_height = height;
        self
    }

    /// Sets the delivered dimensions.
    #[must_use]
    pub const fn with_current_size(mut self, width: u32, height: u32) -> Self {
        self.current_width = width;
        self.current_height = height;
        self
    }

    /// Sets the resolved source path.
    #[must_use]
    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

/// A decoded image together with its metadata, as held by the memory cache.
#[derive(Debug, Clone)]
pub struct CachedImage {
    /// The decoded buffer.
    pub image: Arc<image::DynamicImage>,
    /// Metadata recorded when the image was cached.
    pub info: ImageInformation,
}

/// A successfully loaded image.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The decoded, transformed buffer.
    pub image: Arc<image::DynamicImage>,
    /// Image metadata.
    pub info: ImageInformation,
    /// Where the image came from.
    pub result: LoadingResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_internet_is_remote() {
        assert!(!LoadingResult::Internet.is_local_or_cached());
        assert!(LoadingResult::DiskCache.is_local_or_cached());
        assert!(LoadingResult::MemoryCache.is_local_or_cached());
        assert!(LoadingResult::Stream.is_local_or_cached());
    }

    #[test]
    fn test_information_builder() {
        let info = ImageInformation::new(CacheKey::new("k"), SourceKind::Url)
            .with_original_size(400, 200)
            .with_current_size(100, 50)
            .with_file_path("https://example.com/a.png");

        assert_eq!(info.original_width, 400);
        assert_eq!(info.current_height, 50);
        assert_eq!(info.file_path.as_deref(), Some("https://example.com/a.png"));
    }
}
