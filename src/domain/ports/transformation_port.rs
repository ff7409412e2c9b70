//! Transformation port definition.

use crate::domain::errors::TransformError;

/// A pure pixel transformation.
///
/// The same instance may run concurrently on buffers from different tasks,
/// so implementations must not keep mutable state between calls.
pub trait Transformation: Send + Sync {
    /// Stable identifier including the parameters, e.g. `"Flip,Type=Horizontal"`.
    fn key(&self) -> String;

    /// Produces a new buffer from `image`.
    ///
    /// # Errors
    /// Returns error if the transformation cannot be applied to this image.
    fn transform(&self, image: &image::DynamicImage) -> Result<image::DynamicImage, TransformError>;
}
