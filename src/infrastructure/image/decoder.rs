//! Decoder backed by the `image` crate.

use tracing::trace;

use crate::domain::errors::LoadError;
use crate::domain::ports::{DecodeOptions, DecodedImage, Decoder};

/// Decodes PNG, JPEG and WebP through [`image::load_from_memory`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl ImageCrateDecoder {
    /// Creates a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Decoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<DecodedImage, LoadError> {
        if bytes.is_empty() {
            return Err(LoadError::decode("empty image data"));
        }
        let image = image::load_from_memory(bytes).map_err(|e| LoadError::decode(e.to_string()))?;
        trace!(
            width = image.width(),
            height = image.height(),
            "Decoded image"
        );
        Ok(self.downsample(image, options))
    }
}
