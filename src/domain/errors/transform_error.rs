//! Transformation error types.

use thiserror::Error;

/// Failure of a single transformation. Never fatal to a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum TransformError {
    #[error("region {x},{y} {width}x{height} outside {image_width}x{image_height} image")]
    InvalidRegion {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("unsupported image: {message}")]
    Unsupported { message: String },
}

impl TransformError {
    /// Creates unsupported error.
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}
