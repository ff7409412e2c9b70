//! Image request descriptor and its builder.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::cache_key::CacheKey;
use super::image::{ImageInformation, LoadingResult};
use super::task::{TaskId, TaskOutcome};
use crate::domain::errors::LoadError;
use crate::domain::ports::Transformation;

/// Produces the bytes of a stream source. Called once per resolve attempt.
pub type StreamProducer =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, std::io::Result<Bytes>> + Send + Sync>;

/// Kind of source an image is loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Local file system path.
    FilePath,
    /// Remote URL.
    Url,
    /// Asset shipped with the application.
    ApplicationBundle,
    /// Named resource from the compiled resource catalog.
    CompiledResource,
    /// Caller supplied byte stream.
    Stream,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FilePath => write!(f, "file"),
            Self::Url => write!(f, "url"),
            Self::ApplicationBundle => write!(f, "bundle"),
            Self::CompiledResource => write!(f, "resource"),
            Self::Stream => write!(f, "stream"),
        }
    }
}

/// Where an image's bytes come from.
#[derive(Clone)]
pub enum ImageSource {
    /// Local file.
    File(String),
    /// Remote URL.
    Url(String),
    /// Path relative to the application bundle root.
    Bundle(String),
    /// Name in the compiled resource catalog.
    CompiledResource(String),
    /// Caller supplied producer.
    Stream(StreamProducer),
}

impl ImageSource {
    /// Returns the source kind.
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::File(_) => SourceKind::FilePath,
            Self::Url(_) => SourceKind::Url,
            Self::Bundle(_) => SourceKind::ApplicationBundle,
            Self::CompiledResource(_) => SourceKind::CompiledResource,
            Self::Stream(_) => SourceKind::Stream,
        }
    }

    /// Returns the path identifier, or `None` for streams.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::File(p) | Self::Url(p) | Self::Bundle(p) | Self::CompiledResource(p) => Some(p),
            Self::Stream(_) => None,
        }
    }

    /// Returns the loading result reported when this source is read directly.
    #[must_use]
    pub const fn direct_result(&self) -> LoadingResult {
        match self {
            Self::File(_) => LoadingResult::Filepath,
            Self::Url(_) => LoadingResult::Internet,
            Self::Bundle(_) => LoadingResult::ApplicationBundle,
            Self::CompiledResource(_) => LoadingResult::CompiledResource,
            Self::Stream(_) => LoadingResult::Stream,
        }
    }
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream(..)"),
            other => write!(f, "{}({:?})", other.kind(), other.path().unwrap_or_default()),
        }
    }
}

/// Which cache tiers a request may read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheType {
    /// No caching.
    None,
    /// Decoded images in memory only.
    Memory,
    /// Raw bytes on disk only.
    Disk,
    /// Both tiers.
    #[default]
    All,
}

impl CacheType {
    /// Returns true if the memory tier may be used.
    #[must_use]
    pub const fn allows_memory(self) -> bool {
        matches!(self, Self::Memory | Self::All)
    }

    /// Returns true if the disk tier may be used.
    #[must_use]
    pub const fn allows_disk(self) -> bool {
        matches!(self, Self::Disk | Self::All)
    }
}

/// Requested decode size. A zero dimension means "derive from aspect ratio".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownsampleSize {
    /// Target width, or 0.
    pub width: u32,
    /// Target height, or 0.
    pub height: u32,
}

impl DownsampleSize {
    /// Creates a new size hint.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if neither dimension is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 && self.height == 0
    }
}

/// Units of a downsample size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownsampleUnits {
    /// Physical pixels.
    #[default]
    Pixels,
    /// Device independent points, scaled by the display scale.
    Dip,
}

/// Resampling filter used when downsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    /// Nearest neighbour.
    Nearest,
    /// Bilinear.
    #[default]
    Linear,
    /// Bicubic.
    Cubic,
    /// Lanczos with a window of 3.
    Lanczos,
}

impl InterpolationMode {
    /// Returns the matching `image` crate filter.
    #[must_use]
    pub const fn filter_type(self) -> image::imageops::FilterType {
        use image::imageops::FilterType;
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Linear => FilterType::Triangle,
            Self::Cubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Named priority presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LoadingPriority {
    /// Lowest.
    Lowest,
    /// Low.
    Low,
    /// Normal.
    #[default]
    Normal,
    /// High.
    High,
    /// Highest.
    Highest,
}

impl LoadingPriority {
    /// Returns the numeric priority.
    #[must_use]
    pub const fn value(self) -> i32 {
        match self {
            Self::Lowest => -2,
            Self::Low => -1,
            Self::Normal => 0,
            Self::High => 1,
            Self::Highest => 2,
        }
    }
}

/// Called with the image information and origin on success.
pub type SuccessCallback = Arc<dyn Fn(&ImageInformation, LoadingResult) + Send + Sync>;
/// Called with the error when loading fails.
pub type ErrorCallback = Arc<dyn Fn(&LoadError) + Send + Sync>;
/// Called once when the task ends, whatever the outcome.
pub type FinishCallback = Arc<dyn Fn(TaskId, &TaskOutcome) + Send + Sync>;

/// Completion continuation of a request.
#[derive(Clone, Default)]
pub struct Callbacks {
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    on_finish: Option<FinishCallback>,
}

impl Callbacks {
    /// Invokes the callbacks matching `outcome`, then the finish callback.
    /// Cancellation and invalid targets only reach the finish callback.
    ///
    /// The finish callback runs even if the success or error callback panics.
    pub fn complete(&self, task: TaskId, outcome: &TaskOutcome) {
        let reported = std::panic::catch_unwind(AssertUnwindSafe(|| match outcome {
            TaskOutcome::Completed(loaded) => {
                if let Some(cb) = &self.on_success {
                    cb(&loaded.info, loaded.result);
                }
            }
            TaskOutcome::Failed(err) => {
                if let Some(cb) = &self.on_error {
                    cb(err);
                }
            }
            TaskOutcome::Cancelled | TaskOutcome::InvalidTarget => {}
        }));
        if reported.is_err() {
            error!(task = %task, "Completion callback panicked");
        }
        if let Some(cb) = &self.on_finish {
            cb(task, outcome);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// Immutable description of one image request.
#[derive(Clone)]
pub struct ImageRequest {
    source: ImageSource,
    key: CacheKey,
    cache_duration: Option<Duration>,
    downsample: Option<DownsampleSize>,
    downsample_units: DownsampleUnits,
    interpolation: InterpolationMode,
    transformations: Vec<Arc<dyn Transformation>>,
    priority: i32,
    retry_count: u32,
    retry_delay: Duration,
    custom_cache_key: Option<String>,
    cache_type: CacheType,
    loading_placeholder: Option<ImageSource>,
    error_placeholder: Option<ImageSource>,
    transform_placeholders: Option<bool>,
    delay: Option<Duration>,
    callbacks: Callbacks,
}

impl ImageRequest {
    /// Starts a request for a local file.
    #[must_use]
    pub fn from_file(path: impl Into<String>) -> ImageRequestBuilder {
        ImageRequestBuilder::new(ImageSource::File(path.into()))
    }

    /// Starts a request for a URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> ImageRequestBuilder {
        ImageRequestBuilder::new(ImageSource::Url(url.into()))
    }

    /// Starts a request for an application bundle asset.
    #[must_use]
    pub fn from_bundle(path: impl Into<String>) -> ImageRequestBuilder {
        ImageRequestBuilder::new(ImageSource::Bundle(path.into()))
            .with_priority(LoadingPriority::Normal.value() + 1)
    }

    /// Starts a request for a compiled resource.
    #[must_use]
    pub fn from_compiled_resource(name: impl Into<String>) -> ImageRequestBuilder {
        ImageRequestBuilder::new(ImageSource::CompiledResource(name.into()))
            .with_priority(LoadingPriority::Normal.value() + 1)
    }

    /// Starts a request for a caller supplied stream.
    #[must_use]
    pub fn from_stream(producer: StreamProducer) -> ImageRequestBuilder {
        ImageRequestBuilder::new(ImageSource::Stream(producer))
    }

    /// Source of the image.
    #[must_use]
    pub const fn source(&self) -> &ImageSource {
        &self.source
    }

    /// Derived cache key.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Disk cache lifetime for URL sources.
    #[must_use]
    pub const fn cache_duration(&self) -> Option<Duration> {
        self.cache_duration
    }

    /// Requested decode size.
    #[must_use]
    pub const fn downsample(&self) -> Option<DownsampleSize> {
        self.downsample
    }

    /// Units of the requested decode size.
    #[must_use]
    pub const fn downsample_units(&self) -> DownsampleUnits {
        self.downsample_units
    }

    /// Resampling filter.
    #[must_use]
    pub const fn interpolation(&self) -> InterpolationMode {
        self.interpolation
    }

    /// Transformations in application order.
    #[must_use]
    pub fn transformations(&self) -> &[Arc<dyn Transformation>] {
        &self.transformations
    }

    /// Scheduling priority; higher runs first.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Attempt budget for retryable failures.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Pause between attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Custom part of the cache key.
    #[must_use]
    pub fn custom_cache_key(&self) -> Option<&str> {
        self.custom_cache_key.as_deref()
    }

    /// Cache tiers the request may use.
    #[must_use]
    pub const fn cache_type(&self) -> CacheType {
        self.cache_type
    }

    /// Image shown while loading.
    #[must_use]
    pub const fn loading_placeholder(&self) -> Option<&ImageSource> {
        self.loading_placeholder.as_ref()
    }

    /// Image shown after a failure.
    #[must_use]
    pub const fn error_placeholder(&self) -> Option<&ImageSource> {
        self.error_placeholder.as_ref()
    }

    /// Per request override for transforming placeholders.
    #[must_use]
    pub const fn transform_placeholders(&self) -> Option<bool> {
        self.transform_placeholders
    }

    /// Delay before the task starts.
    #[must_use]
    pub const fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Completion callbacks.
    #[must_use]
    pub const fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }
}

impl std::fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transforms: Vec<String> = self.transformations.iter().map(|t| t.key()).collect();
        f.debug_struct("ImageRequest")
            .field("source", &self.source)
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("cache_type", &self.cache_type)
            .field("transformations", &transforms)
            .finish_non_exhaustive()
    }
}

/// Assembles an [`ImageRequest`].
#[must_use]
pub struct ImageRequestBuilder {
    request: ImageRequest,
}

impl ImageRequestBuilder {
    fn new(source: ImageSource) -> Self {
        Self {
            request: ImageRequest {
                source,
                key: CacheKey::new(""),
                cache_duration: None,
                downsample: None,
                downsample_units: DownsampleUnits::Pixels,
                interpolation: InterpolationMode::default(),
                transformations: Vec::new(),
                priority: LoadingPriority::Normal.value(),
                retry_count: 0,
                retry_delay: Duration::ZERO,
                custom_cache_key: None,
                cache_type: CacheType::default(),
                loading_placeholder: None,
                error_placeholder: None,
                transform_placeholders: None,
                delay: None,
                callbacks: Callbacks::default(),
            },
        }
    }

    /// How long downloaded bytes stay valid in the disk cache.
    pub const fn cache_duration(mut self, duration: Duration) -> Self {
        self.request.cache_duration = Some(duration);
        self
    }

    /// Downsamples to the given size in pixels, keeping aspect ratio.
    pub const fn downsample(mut self, width: u32, height: u32) -> Self {
        self.request.downsample = Some(DownsampleSize::new(width, height));
        self.request.downsample_units = DownsampleUnits::Pixels;
        self
    }

    /// Downsamples to the given size in device independent points.
    pub const fn downsample_in_dip(mut self, width: u32, height: u32) -> Self {
        self.request.downsample = Some(DownsampleSize::new(width, height));
        self.request.downsample_units = DownsampleUnits::Dip;
        self
    }

    /// Sets the resampling filter.
    pub const fn downsample_mode(mut self, mode: InterpolationMode) -> Self {
        self.request.interpolation = mode;
        self
    }

    /// Appends a transformation.
    pub fn transform(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.request.transformations.push(transformation);
        self
    }

    /// Appends several transformations, keeping their order.
    pub fn transforms(mut self, transformations: impl IntoIterator<Item = Arc<dyn Transformation>>) -> Self {
        self.request.transformations.extend(transformations);
        self
    }

    /// Sets the numeric priority.
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.request.priority = priority;
        self
    }

    /// Sets a named priority.
    pub const fn with_loading_priority(self, priority: LoadingPriority) -> Self {
        self.with_priority(priority.value())
    }

    /// Restricts the cache tiers.
    pub const fn with_cache(mut self, cache_type: CacheType) -> Self {
        self.request.cache_type = cache_type;
        self
    }

    /// Retries retryable failures; `count` is the attempt budget.
    pub const fn retry(mut self, count: u32, delay: Duration) -> Self {
        self.request.retry_count = count;
        self.request.retry_delay = delay;
        self
    }

    /// Adds a custom component to the cache key.
    pub fn cache_key(mut self, custom: impl Into<String>) -> Self {
        self.request.custom_cache_key = Some(custom.into());
        self
    }

    /// Sets the placeholder shown while loading.
    pub fn loading_placeholder(mut self, source: ImageSource) -> Self {
        self.request.loading_placeholder = Some(source);
        self
    }

    /// Sets the placeholder shown after a failure.
    pub fn error_placeholder(mut self, source: ImageSource) -> Self {
        self.request.error_placeholder = Some(source);
        self
    }

    /// Overrides whether transformations also apply to placeholders.
    pub const fn transform_placeholders(mut self, enabled: bool) -> Self {
        self.request.transform_placeholders = Some(enabled);
        self
    }

    /// Waits before starting the task.
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.request.delay = Some(delay);
        self
    }

    /// Called on success with the image information.
    pub fn on_success(
        mut self,
        callback: impl Fn(&ImageInformation, LoadingResult) + Send + Sync + 'static,
    ) -> Self {
        self.request.callbacks.on_success = Some(Arc::new(callback));
        self
    }

    /// Called when loading fails.
    pub fn on_error(mut self, callback: impl Fn(&LoadError) + Send + Sync + 'static) -> Self {
        self.request.callbacks.on_error = Some(Arc::new(callback));
        self
    }

    /// Called once when the task ends.
    pub fn on_finish(
        mut self,
        callback: impl Fn(TaskId, &TaskOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.request.callbacks.on_finish = Some(Arc::new(callback));
        self
    }

    /// Freezes the request and derives its cache key.
    #[must_use]
    pub fn build(mut self) -> ImageRequest {
        let custom = self.request.custom_cache_key.as_deref();
        self.request.key = match self.request.source.path() {
            Some(path) => CacheKey::derive(path, custom),
            None => match custom {
                Some(custom) => CacheKey::derive("stream", Some(custom)),
                None => CacheKey::new(format!("stream:{}", uuid::Uuid::new_v4())),
            },
        };
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_stream() -> StreamProducer {
        use futures_util::FutureExt;
        Arc::new(|_token: CancellationToken| async { Ok::<_, std::io::Error>(Bytes::new()) }.boxed())
    }

    #[test]
    fn test_defaults() {
        let request = ImageRequest::from_url("https://example.com/a.png").build();

        assert_eq!(request.source().kind(), SourceKind::Url);
        assert_eq!(request.key().as_str(), "https://example.com/a.png");
        assert_eq!(request.priority(), 0);
        assert_eq!(request.cache_type(), CacheType::All);
        assert_eq!(request.retry_count(), 0);
        assert!(request.transformations().is_empty());
    }

    #[test]
    fn test_finish_runs_after_panicking_error_callback() {
        let finished = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = finished.clone();
        let request = ImageRequest::from_file("/tmp/a.png")
            .on_error(|_| panic!("host callback failed"))
            .on_finish(move |_, _| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
            .build();

        request
            .callbacks()
            .complete(TaskId(1), &TaskOutcome::Failed(LoadError::not_found("/tmp/a.png")));

        assert_eq!(finished.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bundle_sources_get_raised_priority() {
        let bundle = ImageRequest::from_bundle("icons/a.png").build();
        let resource = ImageRequest::from_compiled_resource("logo").build();
        assert_eq!(bundle.priority(), 1);
        assert_eq!(resource.priority(), 1);
    }

    #[test]
    fn test_key_ignores_transformations_and_downsample() {
        let a = ImageRequest::from_file("/tmp/a.png").downsample(10, 0).build();
        let b = ImageRequest::from_file("/tmp/a.png").build();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_custom_key_is_combined() {
        let request = ImageRequest::from_file("/tmp/a.png").cache_key("small").build();
        assert_eq!(request.key().as_str(), "small;/tmp/a.png");
    }

    #[test]
    fn test_streams_without_custom_key_never_collide() {
        let a = ImageRequest::from_stream(empty_stream()).build();
        let b = ImageRequest::from_stream(empty_stream()).build();
        assert_ne!(a.key(), b.key());

        let c = ImageRequest::from_stream(empty_stream()).cache_key("avatar").build();
        let d = ImageRequest::from_stream(empty_stream()).cache_key("avatar").build();
        assert_eq!(c.key(), d.key());
    }

    #[test]
    fn test_downsample_units() {
        let px = ImageRequest::from_file("a").downsample(10, 20).build();
        let dip = ImageRequest::from_file("a").downsample_in_dip(10, 20).build();
        assert_eq!(px.downsample_units(), DownsampleUnits::Pixels);
        assert_eq!(dip.downsample_units(), DownsampleUnits::Dip);
        assert_eq!(dip.downsample(), Some(DownsampleSize::new(10, 20)));
    }

    #[test]
    fn test_cache_type_tiers() {
        assert!(CacheType::All.allows_memory() && CacheType::All.allows_disk());
        assert!(CacheType::Memory.allows_memory() && !CacheType::Memory.allows_disk());
        assert!(!CacheType::Disk.allows_memory() && CacheType::Disk.allows_disk());
        assert!(!CacheType::None.allows_memory() && !CacheType::None.allows_disk());
    }

    #[test]
    fn test_callbacks_dispatch_on_outcome() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let errors = Arc::new(AtomicUsize::new(0));
        let finishes = Arc::new(AtomicUsize::new(0));
        let (e, f) = (errors.clone(), finishes.clone());
        let request = ImageRequest::from_file("a")
            .on_error(move |_| {
                e.fetch_add(1, Ordering::SeqCst);
            })
            .on_finish(move |_, _| {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        request.callbacks().complete(TaskId(1), &TaskOutcome::Cancelled);
        request
            .callbacks()
            .complete(TaskId(1), &TaskOutcome::Failed(LoadError::not_found("a")));

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(finishes.load(Ordering::SeqCst), 2);
    }
}
