//! The per-request state machine.
//!
//! A task probes the memory cache, shows the loading placeholder, resolves
//! bytes (through the disk cache for URLs), decodes under a permit from the
//! decode gate, applies transformations and hands the result to its target.
//! Cancellation and the exit-early switch are checked between every phase.

use std::future::Future;
use std::sync::Arc;

use image::DynamicImage;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{DecodePermit, PipelineContext};
use crate::domain::entities::{
    CacheKey, CachedImage, ImageInformation, ImageRequest, ImageSource, LoadedImage, LoadingResult,
    TaskId, TaskOutcome, TaskState,
};
use crate::domain::errors::LoadError;
use crate::domain::ports::{
    DecodeOptions, DecodedImage, DeliveryTarget, ResolvedData, ResolvedImage, Transformation,
};

/// One image request bound to one delivery target.
pub struct ImageTask {
    id: TaskId,
    request: ImageRequest,
    target: Arc<dyn DeliveryTarget>,
    ctx: PipelineContext,
    token: CancellationToken,
    state: watch::Sender<TaskState>,
}

impl std::fmt::Debug for ImageTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTask")
            .field("id", &self.id)
            .field("key", self.request.key())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ImageTask {
    /// Creates a task. The caller keeps `token` to cancel it and a receiver
    /// of `state` to observe it.
    #[must_use]
    pub fn new(
        id: TaskId,
        request: ImageRequest,
        target: Arc<dyn DeliveryTarget>,
        ctx: PipelineContext,
        token: CancellationToken,
        state: watch::Sender<TaskState>,
    ) -> Self {
        Self {
            id,
            request,
            target,
            ctx,
            token,
            state,
        }
    }

    /// Returns the task id.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Runs the task to its end and reports the outcome.
    ///
    /// Callbacks have been invoked on the delivery context by the time this
    /// returns.
    pub async fn run(self) -> TaskOutcome {
        let outcome = match self.execute().await {
            Ok(loaded) => TaskOutcome::Completed(loaded),
            Err(LoadError::Cancelled) => TaskOutcome::Cancelled,
            Err(LoadError::InvalidTarget) => TaskOutcome::InvalidTarget,
            Err(err) => {
                warn!(task = %self.id, key = %self.request.key(), error = %err, "Image load failed");
                self.show_error_placeholder().await;
                TaskOutcome::Failed(err)
            }
        };
        self.set_state(outcome.state());

        match &outcome {
            TaskOutcome::Completed(loaded) => debug!(
                task = %self.id,
                key = %self.request.key(),
                result = %loaded.result,
                width = loaded.info.current_width,
                height = loaded.info.current_height,
                "Image delivered"
            ),
            TaskOutcome::Cancelled => debug!(task = %self.id, "Task cancelled"),
            TaskOutcome::InvalidTarget => debug!(task = %self.id, "Target no longer wants image"),
            TaskOutcome::Failed(_) => {}
        }

        let callbacks = self.request.callbacks().clone();
        let id = self.id;
        let reported = outcome.clone();
        self.ctx
            .dispatcher
            .post_async(move || callbacks.complete(id, &reported))
            .await;

        outcome
    }

    fn set_state(&self, state: TaskState) {
        self.state.send_replace(state);
        trace!(task = %self.id, state = %state, "Task state");
    }

    fn current_state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// Fails with `Cancelled` once the token fires, or while the exit switch
    /// is on and decoding has not started.
    fn checkpoint(&self) -> Result<(), LoadError> {
        if self.token.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        if self.ctx.exit.is_set() && !self.current_state().has_started_decoding() {
            return Err(LoadError::Cancelled);
        }
        Ok(())
    }

    fn ensure_target(&self) -> Result<(), LoadError> {
        if self.target.is_task_valid(self.id) {
            Ok(())
        } else {
            Err(LoadError::InvalidTarget)
        }
    }

    /// Races `fut` against cancellation and the exit switch. Only used
    /// before decoding starts.
    async fn interruptible<T>(
        &self,
        fut: impl Future<Output = Result<T, LoadError>>,
    ) -> Result<T, LoadError> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(LoadError::Cancelled),
            () = self.ctx.exit.triggered() => Err(LoadError::Cancelled),
            result = fut => result,
        }
    }

    async fn pause(&self, duration: std::time::Duration) -> Result<(), LoadError> {
        if duration.is_zero() {
            return Ok(());
        }
        self.interruptible(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    async fn execute(&self) -> Result<LoadedImage, LoadError> {
        self.checkpoint()?;
        if let Some(delay) = self.request.delay() {
            self.pause(delay).await?;
        }
        self.checkpoint()?;

        self.set_state(TaskState::CacheProbe);
        if self.request.cache_type().allows_memory()
            && self.target.is_valid()
            && let Some(cached) = self.ctx.memory_cache.get(self.request.key()).await
        {
            self.set_state(TaskState::HitDelivered);
            return self.deliver_hit(cached).await;
        }

        self.show_loading_placeholder().await;

        let mut budget = self.request.retry_count();
        loop {
            match self.attempt().await {
                Ok(loaded) => return Ok(loaded),
                Err(err) if err.is_retryable() => {
                    budget = budget.saturating_sub(1);
                    if budget == 0 {
                        return Err(err);
                    }
                    debug!(task = %self.id, error = %err, remaining = budget, "Attempt failed, retrying");
                    self.pause(self.request.retry_delay()).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn deliver_hit(&self, cached: CachedImage) -> Result<LoadedImage, LoadError> {
        self.set_state(TaskState::Delivering);
        self.checkpoint()?;
        self.ensure_target()?;
        trace!(task = %self.id, key = %self.request.key(), "Serving from memory cache");

        self.post_image(cached.image.clone(), true).await?;
        Ok(LoadedImage {
            image: cached.image,
            info: cached.info,
            result: LoadingResult::MemoryCache,
        })
    }

    async fn attempt(&self) -> Result<LoadedImage, LoadError> {
        self.checkpoint()?;
        self.ensure_target()?;

        self.set_state(TaskState::ResolvePending);
        let ResolvedImage {
            data,
            resolved_key,
            result,
        } = self.interruptible(self.fetch(true)).await?;

        let permit = self.admit().await?;
        self.set_state(TaskState::Decoding);
        let (decoded, resolved_key, result, permit) = match self.decode(data).await {
            Ok(decoded) => (decoded, resolved_key, result, permit),
            Err(err) if result == LoadingResult::DiskCache => {
                warn!(
                    task = %self.id,
                    key = %self.request.key(),
                    error = %err,
                    "Dropping undecodable disk cache entry"
                );
                drop(permit);
                self.discard_download().await;

                self.set_state(TaskState::ResolvePending);
                let ResolvedImage {
                    data,
                    resolved_key,
                    result,
                } = self.interruptible(self.fetch(false)).await?;
                let permit = self.admit().await?;
                self.set_state(TaskState::Decoding);
                (self.decode(data).await?, resolved_key, result, permit)
            }
            Err(err) => return Err(err),
        };
        self.checkpoint()?;

        self.set_state(TaskState::Transforming);
        let (original_width, original_height) = (decoded.original_width, decoded.original_height);
        let image = self
            .apply_transformations(decoded.image, self.request.transformations())
            .await?;
        drop(permit);

        self.set_state(TaskState::Delivering);
        let key = self.request.key().clone();
        let mut info = ImageInformation::new(key.clone(), self.request.source().kind())
            .with_original_size(original_width, original_height)
            .with_current_size(image.width(), image.height());
        if self.request.source().path().is_some() {
            info = info.with_file_path(resolved_key);
        }
        let image = Arc::new(image);

        // Cached even if the task was cancelled while transforming.
        if self.request.cache_type().allows_memory() {
            self.ctx
                .memory_cache
                .add(key, image.clone(), info.clone())
                .await;
        }

        self.checkpoint()?;
        self.ensure_target()?;
        self.post_image(image.clone(), false).await?;

        Ok(LoadedImage {
            image,
            info,
            result,
        })
    }

    /// Waits for a decode slot, then re-checks cancellation.
    async fn admit(&self) -> Result<DecodePermit, LoadError> {
        let permit = self
            .interruptible(async {
                self.ctx
                    .gate
                    .acquire(self.request.priority(), self.id.0)
                    .await
                    .ok_or(LoadError::Cancelled)
            })
            .await?;
        self.checkpoint()?;
        Ok(permit)
    }

    async fn discard_download(&self) {
        if let Some(cache) = &self.ctx.download_cache {
            cache.remove(self.request.key().as_str()).await;
        }
    }

    /// Reads the source. For URLs the download cache is consulted first
    /// when `read_disk` is set, and fresh downloads are written back to it.
    async fn fetch(&self, read_disk: bool) -> Result<ResolvedImage, LoadError> {
        let source = self.request.source();
        let disk = match (source, &self.ctx.download_cache) {
            (ImageSource::Url(_), Some(cache)) if self.request.cache_type().allows_disk() => {
                Some(cache)
            }
            _ => None,
        };
        let key = self.request.key().as_str();

        if read_disk
            && let Some(cache) = disk
            && let Some(bytes) = cache.get(key).await
        {
            trace!(task = %self.id, key = %key, "Serving bytes from disk cache");
            let path = source.path().unwrap_or(key).to_string();
            return Ok(ResolvedImage::bytes(bytes, path, LoadingResult::DiskCache));
        }

        let resolved = self.ctx.resolver.resolve(source, &self.token).await?;

        if let Some(cache) = disk
            && let ResolvedData::Bytes(bytes) = &resolved.data
        {
            let ttl = self
                .request
                .cache_duration()
                .unwrap_or(self.ctx.settings.default_cache_duration);
            if let Err(e) = cache.put(key, bytes, Some(ttl)).await {
                warn!(task = %self.id, key = %key, error = %e, "Failed to write disk cache");
            }
        }

        Ok(resolved)
    }

    fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            downsample: self.request.downsample(),
            units: self.request.downsample_units(),
            interpolation: self.request.interpolation(),
            display_scale: self.ctx.settings.display_scale,
        }
    }

    async fn decode(&self, data: ResolvedData) -> Result<DecodedImage, LoadError> {
        let decoder = self.ctx.decoder.clone();
        let options = self.decode_options();
        tokio::task::spawn_blocking(move || match data {
            ResolvedData::Bytes(bytes) => decoder.decode(&bytes, &options),
            ResolvedData::Image(image) => {
                Ok(decoder.downsample(Arc::unwrap_or_clone(image), &options))
            }
        })
        .await
        .map_err(|e| LoadError::decode(format!("decode task failed: {e}")))?
    }

    /// Applies `transformations` in order. A failing transformation is
    /// skipped; cancellation is checked before each one.
    async fn apply_transformations(
        &self,
        image: DynamicImage,
        transformations: &[Arc<dyn Transformation>],
    ) -> Result<DynamicImage, LoadError> {
        if transformations.is_empty() {
            return Ok(image);
        }
        let transformations = transformations.to_vec();
        let token = self.token.clone();
        let task = self.id;
        tokio::task::spawn_blocking(move || {
            let mut current = image;
            for transformation in &transformations {
                if token.is_cancelled() {
                    return Err(LoadError::Cancelled);
                }
                match transformation.transform(&current) {
                    Ok(next) => current = next,
                    Err(e) => warn!(
                        task = %task,
                        transformation = %transformation.key(),
                        error = %e,
                        "Transformation failed, skipping"
                    ),
                }
            }
            Ok(current)
        })
        .await
        .map_err(|e| LoadError::decode(format!("transformation task failed: {e}")))?
    }

    /// Hands `image` to the target on the delivery context, re-checking
    /// cancellation and binding there.
    async fn post_image(&self, image: Arc<DynamicImage>, from_cache: bool) -> Result<(), LoadError> {
        let target = self.target.clone();
        let token = self.token.clone();
        let id = self.id;
        self.ctx
            .dispatcher
            .post_async(move || {
                if token.is_cancelled() {
                    return Err(LoadError::Cancelled);
                }
                if !target.is_task_valid(id) {
                    return Err(LoadError::InvalidTarget);
                }
                target.set_image(image, from_cache, false);
                Ok(())
            })
            .await
            .unwrap_or(Err(LoadError::Cancelled))
    }

    fn transform_placeholders(&self) -> bool {
        self.request
            .transform_placeholders()
            .unwrap_or(self.ctx.settings.transform_placeholders)
    }

    /// Memory cache key of a placeholder: its own path, followed by the
    /// transformation keys when the placeholder is transformed.
    fn placeholder_key(&self, source: &ImageSource) -> Option<CacheKey> {
        if !self.request.cache_type().allows_memory() {
            return None;
        }
        let path = source.path()?;
        let transformations = self.request.transformations();
        if !self.transform_placeholders() || transformations.is_empty() {
            return Some(CacheKey::new(path));
        }
        let keys: Vec<String> = transformations.iter().map(|t| t.key()).collect();
        Some(CacheKey::new(format!("{path};{}", keys.join(";"))))
    }

    /// Loads a placeholder through the memory cache when the request allows
    /// memory caching.
    async fn load_placeholder(&self, source: &ImageSource) -> Result<Arc<DynamicImage>, LoadError> {
        let key = self.placeholder_key(source);
        if let Some(key) = &key
            && let Some(cached) = self.ctx.memory_cache.get(key).await
        {
            return Ok(cached.image);
        }

        let resolved = self
            .interruptible(self.ctx.resolver.resolve(source, &self.token))
            .await?;
        let decoded = self.decode(resolved.data).await?;
        let (original_width, original_height) = (decoded.original_width, decoded.original_height);
        let image = if self.transform_placeholders() {
            self.apply_transformations(decoded.image, self.request.transformations())
                .await?
        } else {
            decoded.image
        };
        let image = Arc::new(image);

        if let Some(key) = key {
            let info = ImageInformation::new(key.clone(), source.kind())
                .with_original_size(original_width, original_height)
                .with_current_size(image.width(), image.height())
                .with_file_path(resolved.resolved_key);
            self.ctx.memory_cache.add(key, image.clone(), info).await;
        }
        Ok(image)
    }

    fn post_placeholder(&self, image: Arc<DynamicImage>) {
        let target = self.target.clone();
        let token = self.token.clone();
        let id = self.id;
        self.ctx.dispatcher.post(move || {
            if !token.is_cancelled() && target.is_task_valid(id) {
                target.set_image(image, false, true);
            }
        });
    }

    async fn show_loading_placeholder(&self) {
        let Some(source) = self.request.loading_placeholder() else {
            return;
        };
        match self.load_placeholder(source).await {
            Ok(image) => self.post_placeholder(image),
            Err(e) if e.is_silent() => {}
            Err(e) => warn!(task = %self.id, error = %e, "Loading placeholder failed"),
        }
    }

    async fn show_error_placeholder(&self) {
        let Some(source) = self.request.error_placeholder() else {
            return;
        };
        if !self.target.is_task_valid(self.id) {
            return;
        }
        match self.load_placeholder(source).await {
            Ok(image) => self.post_placeholder(image),
            Err(e) if e.is_silent() => {}
            Err(e) => warn!(task = %self.id, error = %e, "Error placeholder failed"),
        }
    }
}
