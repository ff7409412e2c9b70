mod decoder_port;
mod delivery_target_port;
mod image_cache_port;
mod source_resolver_port;
mod transformation_port;

pub use decoder_port::{DecodeOptions, DecodedImage, Decoder};
pub use delivery_target_port::DeliveryTarget;
pub use image_cache_port::{CacheError, CacheResult, DownloadCachePort, ImageCachePort};
pub use source_resolver_port::{ResolvedData, ResolvedImage, SourceResolver};
pub use transformation_port::Transformation;
