//! Resolver for caller supplied byte streams.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::entities::{ImageSource, LoadingResult};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ResolvedImage, SourceResolver};

/// Runs the producer of an [`ImageSource::Stream`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamResolver;

#[async_trait]
impl SourceResolver for StreamResolver {
    async fn resolve(
        &self,
        source: &ImageSource,
        token: &CancellationToken,
    ) -> Result<ResolvedImage, LoadError> {
        let ImageSource::Stream(producer) = source else {
            return Err(LoadError::resolution(format!(
                "stream resolver cannot read {source:?}"
            )));
        };
        let produced = tokio::select! {
            () = token.cancelled() => return Err(LoadError::Cancelled),
            produced = producer(token.clone()) => produced,
        };
        let bytes = produced.map_err(|e| LoadError::resolution(format!("stream failed: {e}")))?;
        if bytes.is_empty() {
            return Err(LoadError::resolution("stream produced no data"));
        }
        Ok(ResolvedImage::bytes(bytes, "stream", LoadingResult::Stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::FutureExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_runs_producer() {
        let source = ImageSource::Stream(Arc::new(|_token: CancellationToken| {
            async { Ok::<_, std::io::Error>(Bytes::from_static(b"data")) }.boxed()
        }));
        let resolved = StreamResolver
            .resolve(&source, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved.result, LoadingResult::Stream);
    }

    #[tokio::test]
    async fn test_producer_error_is_retryable() {
        let source = ImageSource::Stream(Arc::new(|_token: CancellationToken| {
            async { Err::<Bytes, _>(std::io::Error::other("boom")) }.boxed()
        }));
        let err = StreamResolver
            .resolve(&source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
