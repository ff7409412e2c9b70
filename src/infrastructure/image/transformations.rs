//! Reference pixel transformations.

use image::DynamicImage;

use crate::domain::errors::TransformError;
use crate::domain::ports::Transformation;

/// Mirror axis of a [`FlipTransformation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlipType {
    /// Mirror left to right.
    #[default]
    Horizontal,
    /// Mirror top to bottom.
    Vertical,
}

impl std::fmt::Display for FlipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Horizontal => write!(f, "Horizontal"),
            Self::Vertical => write!(f, "Vertical"),
        }
    }
}

/// Mirrors the image along one axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlipTransformation {
    flip: FlipType,
}

impl FlipTransformation {
    /// Creates a flip along `flip`.
    #[must_use]
    pub const fn new(flip: FlipType) -> Self {
        Self { flip }
    }
}

impl Transformation for FlipTransformation {
    fn key(&self) -> String {
        format!("FlipTransformation,Type={}", self.flip)
    }

    fn transform(&self, image: &DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(match self.flip {
            FlipType::Horizontal => image.fliph(),
            FlipType::Vertical => image.flipv(),
        })
    }
}

/// Cuts out a rectangle of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropTransformation {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl CropTransformation {
    /// Creates a crop of `width` x `height` starting at (`x`, `y`).
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl Transformation for CropTransformation {
    fn key(&self) -> String {
        format!(
            "CropTransformation,X={},Y={},Width={},Height={}",
            self.x, self.y, self.width, self.height
        )
    }

    fn transform(&self, image: &DynamicImage) -> Result<DynamicImage, TransformError> {
        let fits = self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= image.width())
            && self.y.checked_add(self.height).is_some_and(|b| b <= image.height());
        if !fits {
            return Err(TransformError::InvalidRegion {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                image_width: image.width(),
                image_height: image.height(),
            });
        }
        Ok(image.crop_imm(self.x, self.y, self.width, self.height))
    }
}

/// Converts the image to grayscale, keeping alpha.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscaleTransformation;

impl Transformation for GrayscaleTransformation {
    fn key(&self) -> String {
        "GrayscaleTransformation".to_string()
    }

    fn transform(&self, image: &DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(DynamicImage::ImageRgba8(image.grayscale().to_rgba8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(image::RgbaImage::from_fn(width, height, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([x as u8, y as u8, 0, 255])
        }))
    }

    fn apply(image: &DynamicImage, steps: &[&dyn Transformation]) -> DynamicImage {
        steps
            .iter()
            .fold(image.clone(), |img, t| t.transform(&img).unwrap())
    }

    #[test]
    fn test_flip_horizontal_moves_pixels() {
        let img = gradient(4, 2);
        let flipped = FlipTransformation::new(FlipType::Horizontal)
            .transform(&img)
            .unwrap();
        assert_eq!(flipped.get_pixel(0, 0), img.get_pixel(3, 0));
        assert_eq!(flipped.get_pixel(3, 1), img.get_pixel(0, 1));
    }

    #[test]
    fn test_flip_vertical_moves_pixels() {
        let img = gradient(2, 4);
        let flipped = FlipTransformation::new(FlipType::Vertical)
            .transform(&img)
            .unwrap();
        assert_eq!(flipped.get_pixel(1, 0), img.get_pixel(1, 3));
    }

    #[test]
    fn test_keys_include_parameters() {
        assert_eq!(
            FlipTransformation::new(FlipType::Vertical).key(),
            "FlipTransformation,Type=Vertical"
        );
        assert_eq!(
            CropTransformation::new(1, 2, 3, 4).key(),
            "CropTransformation,X=1,Y=2,Width=3,Height=4"
        );
    }

    #[test]
    fn test_order_matters() {
        let img = gradient(8, 4);
        let crop = CropTransformation::new(0, 0, 4, 4);
        let flip = FlipTransformation::new(FlipType::Horizontal);

        let crop_then_flip = apply(&img, &[&crop, &flip]);
        let flip_then_crop = apply(&img, &[&flip, &crop]);

        assert_eq!(crop_then_flip.dimensions(), flip_then_crop.dimensions());
        assert_ne!(crop_then_flip.as_bytes(), flip_then_crop.as_bytes());
    }

    #[test]
    fn test_crop_out_of_bounds_fails() {
        let img = gradient(4, 4);
        let err = CropTransformation::new(2, 2, 4, 4).transform(&img).unwrap_err();
        assert!(matches!(err, TransformError::InvalidRegion { image_width: 4, .. }));
    }

    #[test]
    fn test_grayscale_equalizes_channels() {
        let img = gradient(4, 4);
        let gray = GrayscaleTransformation.transform(&img).unwrap().to_rgba8();
        let px = gray.get_pixel(3, 2);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], 255);
    }
}
