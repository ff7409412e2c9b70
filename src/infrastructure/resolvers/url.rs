//! HTTP resolver built on reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::entities::{ImageSource, LoadingResult};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ResolvedImage, SourceResolver};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of simultaneous downloads.
pub const DEFAULT_MAX_DOWNLOADS: usize = 4;

/// Downloads [`ImageSource::Url`] sources.
///
/// Downloads are throttled by a semaphore; tasks beyond the limit wait for a
/// slot and give up if they are cancelled first.
#[derive(Clone)]
pub struct UrlResolver {
    http_client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for UrlResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlResolver")
            .field("available_slots", &self.semaphore.available_permits())
            .finish_non_exhaustive()
    }
}

impl UrlResolver {
    /// Creates a resolver with the given timeout and download limit.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(timeout: Duration, max_concurrent_downloads: usize) -> Result<Self, LoadError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::resolution(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(http_client, max_concurrent_downloads))
    }

    /// Creates a resolver around an existing client.
    #[must_use]
    pub fn with_client(http_client: reqwest::Client, max_concurrent_downloads: usize) -> Self {
        Self {
            http_client,
            semaphore: Arc::new(Semaphore::new(max_concurrent_downloads.max(1))),
        }
    }

    async fn download(&self, url: &str) -> Result<(Bytes, String), LoadError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::resolution(format!("Request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(LoadError::not_found(url));
        }
        if !status.is_success() {
            return Err(LoadError::resolution(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let final_url = response.url().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::resolution(format!("Failed to read body: {e}")))?;

        Ok((bytes, final_url))
    }
}

#[async_trait]
impl SourceResolver for UrlResolver {
    async fn resolve(
        &self,
        source: &ImageSource,
        token: &CancellationToken,
    ) -> Result<ResolvedImage, LoadError> {
        let ImageSource::Url(url) = source else {
            return Err(LoadError::resolution(format!(
                "url resolver cannot read {source:?}"
            )));
        };

        let _permit = tokio::select! {
            () = token.cancelled() => return Err(LoadError::Cancelled),
            permit = self.semaphore.acquire() => permit
                .map_err(|_| LoadError::resolution("download limiter closed"))?,
        };

        debug!(url = %url, "Downloading image");
        let (bytes, final_url) = tokio::select! {
            () = token.cancelled() => return Err(LoadError::Cancelled),
            downloaded = self.download(url) => downloaded?,
        };
        debug!(url = %url, size = bytes.len(), "Downloaded image");

        Ok(ResolvedImage::bytes(bytes, final_url, LoadingResult::Internet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_other_sources() {
        let resolver = UrlResolver::new(DEFAULT_TIMEOUT, DEFAULT_MAX_DOWNLOADS).unwrap();
        let err = resolver
            .resolve(&ImageSource::File("a.png".into()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::ResolutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_download() {
        let resolver = UrlResolver::new(DEFAULT_TIMEOUT, 1).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = resolver
            .resolve(&ImageSource::Url("http://127.0.0.1:9/a.png".into()), &token)
            .await
            .unwrap_err();
        assert_eq!(err, LoadError::Cancelled);
    }
}
