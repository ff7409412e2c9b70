//! Entry point that wires the pipeline together from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use super::{DecodeGate, ExitSignal, PipelineContext, PipelineSettings, TaskHandle, TaskInfo, WorkScheduler};
use crate::domain::entities::{CacheKey, CacheType, ImageRequest, SourceKind};
use crate::domain::ports::{
    CacheError, CacheResult, Decoder, DeliveryTarget, DownloadCachePort, ImageCachePort,
    SourceResolver,
};
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::delivery::{DeliveryDispatcher, DetachedTarget};
use crate::infrastructure::image::{
    CacheStats, DiskImageCache, ImageCrateDecoder, MemoryImageCache, default_cache_dir,
};
use crate::infrastructure::resolvers::{
    BundleResolver, ResolverRegistry, ResourceCatalog, UrlResolver,
};

enum DiskChoice {
    Configured,
    Custom(Arc<dyn DownloadCachePort>),
    Disabled,
}

/// Assembles an [`ImageService`], optionally with injected collaborators.
#[must_use]
pub struct ImageServiceBuilder {
    config: PipelineConfig,
    memory_cache: Option<Arc<dyn ImageCachePort>>,
    disk: DiskChoice,
    resolver: Option<Arc<dyn SourceResolver>>,
    decoder: Option<Arc<dyn Decoder>>,
    resources: Arc<ResourceCatalog>,
}

impl ImageServiceBuilder {
    fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            memory_cache: None,
            disk: DiskChoice::Configured,
            resolver: None,
            decoder: None,
            resources: Arc::new(ResourceCatalog::new()),
        }
    }

    /// Uses a custom decoded image cache.
    pub fn memory_cache(mut self, cache: Arc<dyn ImageCachePort>) -> Self {
        self.memory_cache = Some(cache);
        self
    }

    /// Uses a custom download cache.
    pub fn download_cache(mut self, cache: Arc<dyn DownloadCachePort>) -> Self {
        self.disk = DiskChoice::Custom(cache);
        self
    }

    /// Runs without a download cache.
    pub fn without_download_cache(mut self) -> Self {
        self.disk = DiskChoice::Disabled;
        self
    }

    /// Uses a custom resolver for every kind of source.
    pub fn resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Uses a custom decoder.
    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Serves compiled resources from `catalog`.
    pub fn resources(mut self, catalog: Arc<ResourceCatalog>) -> Self {
        self.resources = catalog;
        self
    }

    fn default_resolver(&self) -> CacheResult<Arc<dyn SourceResolver>> {
        let url = UrlResolver::new(
            self.config.http_timeout(),
            self.config.max_concurrent_downloads,
        )
        .map_err(|e| CacheError::NetworkError(e.to_string()))?;
        let bundle_root = self.config.bundle_root.clone().unwrap_or_else(default_bundle_root);

        Ok(Arc::new(
            ResolverRegistry::new()
                .with(SourceKind::Url, Arc::new(url))
                .with(SourceKind::ApplicationBundle, Arc::new(BundleResolver::new(bundle_root)))
                .with(SourceKind::CompiledResource, self.resources.clone()),
        ))
    }

    /// Builds the service. Must be called within a tokio runtime.
    ///
    /// # Errors
    /// Returns error if the download cache directory or the HTTP client
    /// cannot be created.
    pub async fn build(self) -> CacheResult<ImageService> {
        let (memory_cache, memory_stats) = match self.memory_cache.clone() {
            Some(cache) => (cache, None),
            None => {
                let cache = Arc::new(MemoryImageCache::new(self.config.memory_cache_bytes));
                (cache.clone() as Arc<dyn ImageCachePort>, Some(cache))
            }
        };

        let download_cache: Option<Arc<dyn DownloadCachePort>> = match &self.disk {
            DiskChoice::Configured => {
                let dir = self.config.disk_cache_dir.clone().unwrap_or_else(default_cache_dir);
                let cache = DiskImageCache::new(dir, self.config.disk_cache_bytes).await?;
                Some(Arc::new(cache))
            }
            DiskChoice::Custom(cache) => Some(cache.clone()),
            DiskChoice::Disabled => None,
        };

        let resolver = match self.resolver.clone() {
            Some(resolver) => resolver,
            None => self.default_resolver()?,
        };
        let decoder = self
            .decoder
            .clone()
            .unwrap_or_else(|| Arc::new(ImageCrateDecoder::new()));

        let ctx = PipelineContext {
            memory_cache: memory_cache.clone(),
            download_cache: download_cache.clone(),
            resolver,
            decoder,
            dispatcher: DeliveryDispatcher::spawn(),
            gate: DecodeGate::new(self.config.max_concurrent_decodes),
            exit: ExitSignal::new(),
            settings: PipelineSettings {
                transform_placeholders: self.config.transform_placeholders,
                display_scale: self.config.display_scale,
                default_cache_duration: self.config.disk_cache_duration(),
            },
        };

        info!(
            max_decodes = ctx.gate.max_concurrent(),
            memory_bytes = self.config.memory_cache_bytes,
            disk_cache = download_cache.is_some(),
            "Image pipeline ready"
        );

        Ok(ImageService {
            scheduler: WorkScheduler::new(ctx),
            memory_cache,
            memory_stats,
            download_cache,
            resources: self.resources,
        })
    }
}

fn default_bundle_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Loads images into delivery targets.
///
/// Cheap to clone; clones share caches, queues and the exit-early switch.
#[derive(Clone)]
pub struct ImageService {
    scheduler: WorkScheduler,
    memory_cache: Arc<dyn ImageCachePort>,
    memory_stats: Option<Arc<MemoryImageCache>>,
    download_cache: Option<Arc<dyn DownloadCachePort>>,
    resources: Arc<ResourceCatalog>,
}

impl std::fmt::Debug for ImageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageService")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl ImageService {
    /// Starts building a service from `config`.
    pub fn builder(config: PipelineConfig) -> ImageServiceBuilder {
        ImageServiceBuilder::new(config)
    }

    /// Builds a service with the default collaborators.
    ///
    /// # Errors
    /// Returns error if the download cache or HTTP client cannot be created.
    pub async fn new(config: PipelineConfig) -> CacheResult<Self> {
        Self::builder(config).build().await
    }

    /// Returns the scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &WorkScheduler {
        &self.scheduler
    }

    /// Returns the catalog serving compiled resources.
    #[must_use]
    pub const fn resources(&self) -> &Arc<ResourceCatalog> {
        &self.resources
    }

    /// Loads `request` into `target`, superseding earlier work for it.
    pub fn load(&self, request: ImageRequest, target: Arc<dyn DeliveryTarget>) -> TaskHandle {
        self.scheduler.schedule(request, target)
    }

    /// Runs `request` through the pipeline only to fill the caches.
    pub fn preload(&self, request: ImageRequest) -> TaskHandle {
        self.scheduler.schedule(request, Arc::new(DetachedTarget::new()))
    }

    /// See [`WorkScheduler::set_exit_tasks_early`].
    pub fn set_exit_tasks_early(&self, exit: bool) {
        self.scheduler.set_exit_tasks_early(exit);
    }

    /// See [`WorkScheduler::cancel_all`].
    pub fn cancel_all(&self, predicate: impl Fn(&TaskInfo<'_>) -> bool) -> usize {
        self.scheduler.cancel_all(predicate)
    }

    /// Cancels every live task.
    pub fn cancel_everything(&self) -> usize {
        self.scheduler.cancel_everything()
    }

    /// Removes `key` from the selected cache tiers.
    pub async fn invalidate(&self, key: &CacheKey, cache_type: CacheType) {
        if cache_type.allows_memory() {
            self.memory_cache.invalidate(key).await;
        }
        if cache_type.allows_disk()
            && let Some(disk) = &self.download_cache
        {
            disk.remove(key.as_str()).await;
        }
        debug!(key = %key, ?cache_type, "Invalidated cache entry");
    }

    /// Removes the entries of a plain URL request from the selected tiers.
    pub async fn invalidate_url(&self, url: &str, cache_type: CacheType) {
        self.invalidate(&CacheKey::new(url), cache_type).await;
    }

    /// Empties the selected cache tiers.
    ///
    /// # Errors
    /// Returns error if the download cache cannot be cleared.
    pub async fn clear_caches(&self, cache_type: CacheType) -> CacheResult<()> {
        if cache_type.allows_memory() {
            self.memory_cache.clear().await;
        }
        if cache_type.allows_disk()
            && let Some(disk) = &self.download_cache
        {
            disk.clear().await?;
        }
        Ok(())
    }

    /// Returns statistics of the built-in memory cache, or None when a
    /// custom cache was injected.
    #[must_use]
    pub fn memory_cache_stats(&self) -> Option<CacheStats> {
        self.memory_stats.as_ref().map(|cache| cache.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::LoadingResult;
    use crate::domain::ports::mocks::{MockResolver, gradient_png};
    use crate::infrastructure::delivery::ImageSlot;
    use crate::infrastructure::image::DEFAULT_MAX_CACHE_SIZE;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            disk_cache_dir: Some(dir.path().join("downloads")),
            max_concurrent_decodes: 2,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_url_goes_through_disk_cache() {
        let dir = TempDir::new().unwrap();
        let resolver = Arc::new(MockResolver::new(8, 8));
        let service = ImageService::builder(config(&dir))
            .resolver(resolver.clone())
            .build()
            .await
            .unwrap();
        let url = "https://example.com/a.png";

        let first = service
            .load(ImageRequest::from_url(url).build(), Arc::new(ImageSlot::new()))
            .wait()
            .await;
        assert_eq!(first.image().unwrap().result, LoadingResult::Internet);

        service.invalidate_url(url, CacheType::Memory).await;
        let second = service
            .load(ImageRequest::from_url(url).build(), Arc::new(ImageSlot::new()))
            .wait()
            .await;
        assert_eq!(second.image().unwrap().result, LoadingResult::DiskCache);
        assert_eq!(resolver.calls(), 1);

        service.invalidate_url(url, CacheType::All).await;
        service
            .load(ImageRequest::from_url(url).build(), Arc::new(ImageSlot::new()))
            .wait()
            .await;
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_disk_entry_falls_back_to_network() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.com/poisoned.png";
        DiskImageCache::new(dir.path().join("downloads"), DEFAULT_MAX_CACHE_SIZE)
            .await
            .unwrap()
            .write(url, b"not an image at all", None)
            .await
            .unwrap();
        let resolver = Arc::new(MockResolver::new(8, 8));
        let service = ImageService::builder(config(&dir))
            .resolver(resolver.clone())
            .build()
            .await
            .unwrap();

        let first = service
            .load(
                ImageRequest::from_url(url).retry(3, Duration::from_millis(1)).build(),
                Arc::new(ImageSlot::new()),
            )
            .wait()
            .await;
        assert_eq!(first.image().unwrap().result, LoadingResult::Internet);
        assert_eq!(resolver.calls(), 1);

        service.invalidate_url(url, CacheType::Memory).await;
        let second = service
            .load(ImageRequest::from_url(url).build(), Arc::new(ImageSlot::new()))
            .wait()
            .await;
        assert_eq!(second.image().unwrap().result, LoadingResult::DiskCache);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_preload_fills_memory_cache() {
        let dir = TempDir::new().unwrap();
        let resolver = Arc::new(MockResolver::new(8, 8));
        let service = ImageService::builder(config(&dir))
            .resolver(resolver.clone())
            .without_download_cache()
            .build()
            .await
            .unwrap();

        let outcome = service
            .preload(ImageRequest::from_file("/img/a.png").build())
            .wait()
            .await;
        assert!(outcome.is_completed());

        let slot = Arc::new(ImageSlot::new());
        let hit = service
            .load(ImageRequest::from_file("/img/a.png").build(), slot.clone())
            .wait()
            .await;
        assert!(slot.current().unwrap().from_cache);
        assert!(hit.is_completed());
        assert_eq!(resolver.calls(), 1);
        assert_eq!(service.memory_cache_stats().unwrap().hits, 1);
    }

    #[tokio::test]
    async fn test_compiled_resources_use_default_resolver() {
        let dir = TempDir::new().unwrap();
        let service = ImageService::builder(config(&dir))
            .without_download_cache()
            .build()
            .await
            .unwrap();
        service.resources().insert("logo", gradient_png(6, 3));

        let outcome = service
            .load(
                ImageRequest::from_compiled_resource("logo").build(),
                Arc::new(ImageSlot::new()),
            )
            .wait()
            .await;
        let loaded = outcome.image().unwrap();
        assert_eq!(loaded.info.current_width, 6);
        assert_eq!(loaded.result, LoadingResult::CompiledResource);
    }

    #[tokio::test]
    async fn test_clear_caches() {
        let dir = TempDir::new().unwrap();
        let service = ImageService::builder(config(&dir))
            .resolver(Arc::new(MockResolver::new(4, 4)))
            .build()
            .await
            .unwrap();

        service
            .preload(ImageRequest::from_url("https://example.com/x.png").build())
            .wait()
            .await;
        assert_eq!(service.memory_cache_stats().unwrap().size, 1);

        service.clear_caches(CacheType::All).await.unwrap();
        assert_eq!(service.memory_cache_stats().unwrap().size, 0);
    }
}
