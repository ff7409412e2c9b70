//! Infrastructure layer with adapters for the domain ports.

/// Pipeline configuration.
pub mod config;
/// Delivery context and in-memory targets.
pub mod delivery;
/// Image caches, decoding and transformations.
pub mod image;
/// Logging bootstrap.
pub mod logging;
/// Source resolvers.
pub mod resolvers;

pub use config::{ConfigError, ConfigStore, LogLevel, PipelineConfig};
pub use delivery::{DeliveryDispatcher, DetachedTarget, ImageSlot};
pub use image::{
    CacheStats, CropTransformation, DiskImageCache, FlipTransformation, FlipType,
    GrayscaleTransformation, ImageCrateDecoder, MemoryImageCache,
};
pub use logging::init_logging;
pub use resolvers::{
    BundleResolver, FileResolver, ResolverRegistry, ResourceCatalog, StreamResolver, UrlResolver,
};
