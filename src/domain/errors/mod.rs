//! Domain error types.

mod load_error;
mod transform_error;

pub use load_error::LoadError;
pub use transform_error::TransformError;
