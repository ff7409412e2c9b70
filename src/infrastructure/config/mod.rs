//! Pipeline configuration.

pub mod app_config;
pub mod storage;

pub use app_config::{LogLevel, PipelineConfig};
pub use storage::{ConfigError, ConfigStore};
