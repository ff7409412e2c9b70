//! Services shared by every task of a pipeline.

use std::sync::Arc;
use std::time::Duration;

use super::{DecodeGate, ExitSignal};
use crate::domain::ports::{Decoder, DownloadCachePort, ImageCachePort, SourceResolver};
use crate::infrastructure::delivery::DeliveryDispatcher;

/// Defaults applied to requests that do not override them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Whether transformations also apply to placeholders.
    pub transform_placeholders: bool,
    /// Pixels per device independent point.
    pub display_scale: f32,
    /// Disk lifetime of downloaded bytes.
    pub default_cache_duration: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            transform_placeholders: true,
            display_scale: 1.0,
            default_cache_duration: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Explicitly injected collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    /// Decoded image cache.
    pub memory_cache: Arc<dyn ImageCachePort>,
    /// Downloaded bytes cache, if enabled.
    pub download_cache: Option<Arc<dyn DownloadCachePort>>,
    /// Source resolver.
    pub resolver: Arc<dyn SourceResolver>,
    /// Decoder.
    pub decoder: Arc<dyn Decoder>,
    /// Delivery context.
    pub dispatcher: DeliveryDispatcher,
    /// Decode admission.
    pub gate: DecodeGate,
    /// Exit tasks early switch.
    pub exit: ExitSignal,
    /// Request defaults.
    pub settings: PipelineSettings,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("gate", &self.gate)
            .field("exit", &self.exit)
            .field("disk_cache", &self.download_cache.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
