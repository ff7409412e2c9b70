//! Application layer with the pipeline engine.

/// Engine services.
pub mod services;

pub use services::{ImageService, ImageServiceBuilder, TaskHandle, TaskInfo, WorkScheduler};
