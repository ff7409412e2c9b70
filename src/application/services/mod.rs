//! Pipeline engine services.

mod decode_gate;
mod exit_signal;
mod image_service;
mod image_task;
mod pipeline_context;
mod work_scheduler;

pub use decode_gate::{DecodeGate, DecodePermit};
pub use exit_signal::ExitSignal;
pub use image_service::{ImageService, ImageServiceBuilder};
pub use image_task::ImageTask;
pub use pipeline_context::{PipelineContext, PipelineSettings};
pub use work_scheduler::{TaskHandle, TaskInfo, WorkScheduler};
