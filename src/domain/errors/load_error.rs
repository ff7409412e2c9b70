//! Image loading error types.

use thiserror::Error;

/// Why a task could not deliver its image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("failed to resolve image source: {message}")]
    ResolutionFailed { message: String },

    #[error("failed to decode image: {message}")]
    DecodeFailed { message: String },

    #[error("image source not found: {path}")]
    NotFound { path: String },

    #[error("task cancelled")]
    Cancelled,

    #[error("delivery target no longer wants this image")]
    InvalidTarget,
}

impl LoadError {
    /// Creates resolution error.
    #[must_use]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::ResolutionFailed {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    /// Creates not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Returns whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ResolutionFailed { .. } | Self::DecodeFailed { .. }
        )
    }

    /// Returns whether the error ends the task silently, without `on_error`.
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        matches!(self, Self::Cancelled | Self::InvalidTarget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(LoadError::resolution("timeout").is_retryable());
        assert!(LoadError::decode("bad header").is_retryable());
        assert!(!LoadError::not_found("a.png").is_retryable());
        assert!(!LoadError::Cancelled.is_retryable());
    }

    #[test]
    fn test_silent_kinds() {
        assert!(LoadError::Cancelled.is_silent());
        assert!(LoadError::InvalidTarget.is_silent());
        assert!(!LoadError::decode("x").is_silent());
    }

    #[test]
    fn test_display() {
        let err = LoadError::not_found("/tmp/missing.png");
        assert_eq!(err.to_string(), "image source not found: /tmp/missing.png");
    }
}
