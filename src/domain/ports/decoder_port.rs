//! Decoder port definition.

use crate::domain::entities::{DownsampleSize, DownsampleUnits, InterpolationMode};
use crate::domain::errors::LoadError;

/// Decode-time resize hints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    /// Requested size, if any.
    pub downsample: Option<DownsampleSize>,
    /// Units of `downsample`.
    pub units: DownsampleUnits,
    /// Resampling filter.
    pub interpolation: InterpolationMode,
    /// Pixels per device independent point.
    pub display_scale: f32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            downsample: None,
            units: DownsampleUnits::Pixels,
            interpolation: InterpolationMode::default(),
            display_scale: 1.0,
        }
    }
}

impl DecodeOptions {
    /// Returns the dimensions a `width` x `height` source should be scaled to,
    /// or None when no scaling is needed.
    ///
    /// Aspect ratio is always kept: when both dimensions are given the tighter
    /// ratio wins. Images are never upscaled.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn target_dimensions(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let size = self.downsample.filter(|s| !s.is_empty())?;
        if width == 0 || height == 0 {
            return None;
        }

        let scale = match self.units {
            DownsampleUnits::Pixels => 1.0,
            DownsampleUnits::Dip => f64::from(self.display_scale.max(0.0)),
        };
        let wanted_w = (f64::from(size.width) * scale).round();
        let wanted_h = (f64::from(size.height) * scale).round();

        let ratio_w = if wanted_w > 0.0 {
            wanted_w / f64::from(width)
        } else {
            f64::INFINITY
        };
        let ratio_h = if wanted_h > 0.0 {
            wanted_h / f64::from(height)
        } else {
            f64::INFINITY
        };
        let ratio = ratio_w.min(ratio_h);
        if !ratio.is_finite() || ratio >= 1.0 {
            return None;
        }

        let new_w = ((f64::from(width) * ratio).round() as u32).max(1);
        let new_h = ((f64::from(height) * ratio).round() as u32).max(1);
        Some((new_w, new_h))
    }
}

/// A decoded buffer with the dimensions of its source.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// The decoded, possibly downsampled, buffer.
    pub image: image::DynamicImage,
    /// Source width before downsampling.
    pub original_width: u32,
    /// Source height before downsampling.
    pub original_height: u32,
}

/// Port that converts encoded bytes into a bitmap.
///
/// Called from the blocking pool; implementations may take their time but
/// must be safe to share across threads.
pub trait Decoder: Send + Sync {
    /// Decodes `bytes`, applying the resize hints in `options`.
    ///
    /// # Errors
    /// Returns [`LoadError::DecodeFailed`] for corrupt or unsupported data.
    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<DecodedImage, LoadError>;

    /// Applies the resize hints to an image that arrived already decoded.
    fn downsample(&self, image: image::DynamicImage, options: &DecodeOptions) -> DecodedImage {
        let (original_width, original_height) = (image.width(), image.height());
        let image = match options.target_dimensions(original_width, original_height) {
            Some((width, height)) => {
                image.resize_exact(width, height, options.interpolation.filter_type())
            }
            None => image,
        };
        DecodedImage {
            image,
            original_width,
            original_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn options(width: u32, height: u32) -> DecodeOptions {
        DecodeOptions {
            downsample: Some(DownsampleSize::new(width, height)),
            ..DecodeOptions::default()
        }
    }

    #[test_case(400, 200, 100, 0, Some((100, 50)) ; "width_only_keeps_ratio")]
    #[test_case(400, 200, 0, 50, Some((100, 50)) ; "height_only_keeps_ratio")]
    #[test_case(400, 200, 100, 100, Some((100, 50)) ; "tighter_ratio_wins")]
    #[test_case(400, 200, 800, 0, None ; "never_upscales")]
    #[test_case(400, 200, 400, 200, None ; "same_size_is_noop")]
    #[test_case(400, 200, 0, 0, None ; "empty_hint_is_noop")]
    fn test_target_dimensions(
        w: u32,
        h: u32,
        dw: u32,
        dh: u32,
        expected: Option<(u32, u32)>,
    ) {
        assert_eq!(options(dw, dh).target_dimensions(w, h), expected);
    }

    #[test]
    fn test_dip_units_use_display_scale() {
        let opts = DecodeOptions {
            downsample: Some(DownsampleSize::new(50, 0)),
            units: DownsampleUnits::Dip,
            display_scale: 2.0,
            ..DecodeOptions::default()
        };
        assert_eq!(opts.target_dimensions(400, 200), Some((100, 50)));
    }

    #[test]
    fn test_no_hint() {
        assert_eq!(DecodeOptions::default().target_dimensions(10, 10), None);
    }
}
