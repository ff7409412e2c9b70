//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching of decoded images with a byte budget
//! - Disk caching of downloaded bytes with expiry
//! - Decoding through the `image` crate
//! - Reference transformations

pub mod decoder;
pub mod disk_cache;
pub mod memory_cache;
pub mod transformations;

pub use decoder::ImageCrateDecoder;
pub use disk_cache::{DEFAULT_MAX_CACHE_SIZE, DiskImageCache, default_cache_dir};
pub use memory_cache::{CacheStats, DEFAULT_CACHE_BYTES, MemoryImageCache, image_size};
pub use transformations::{
    CropTransformation, FlipTransformation, FlipType, GrayscaleTransformation,
};
