//! Pipeline configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) const APP_NAME: &str = "imgpipe";
pub(crate) const APP_QUALIFIER: &str = "dev";
pub(crate) const APP_ORGANIZATION: &str = "imgpipe";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Settings of the image pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path. Logs go to stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Byte budget of the decoded image cache.
    #[serde(default = "default_memory_cache_bytes")]
    pub memory_cache_bytes: usize,

    /// Directory of the download cache. Uses the platform cache dir when unset.
    #[serde(default)]
    pub disk_cache_dir: Option<PathBuf>,

    /// Size cap of the download cache.
    #[serde(default = "default_disk_cache_bytes")]
    pub disk_cache_bytes: u64,

    /// Lifetime of downloaded bytes when a request sets none.
    #[serde(default = "default_disk_cache_duration_secs")]
    pub disk_cache_duration_secs: u64,

    /// Maximum simultaneous decodes.
    #[serde(default = "default_max_concurrent_decodes")]
    pub max_concurrent_decodes: usize,

    /// Maximum simultaneous downloads.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Whether request transformations also apply to placeholders.
    #[serde(default = "default_true")]
    pub transform_placeholders: bool,

    /// Pixels per device independent point.
    #[serde(default = "default_display_scale")]
    pub display_scale: f32,

    /// Root directory of application bundle assets.
    #[serde(default)]
    pub bundle_root: Option<PathBuf>,
}

fn default_memory_cache_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_disk_cache_bytes() -> u64 {
    200 * 1024 * 1024
}

fn default_disk_cache_duration_secs() -> u64 {
    30 * 24 * 60 * 60
}

/// Uses 80% of the available cores, but at least two.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn default_max_concurrent_decodes() -> usize {
    let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    ((cores as f64 * 0.8) as usize).max(2)
}

fn default_max_concurrent_downloads() -> usize {
    4
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_display_scale() -> f32 {
    1.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_path: None,
            memory_cache_bytes: default_memory_cache_bytes(),
            disk_cache_dir: None,
            disk_cache_bytes: default_disk_cache_bytes(),
            disk_cache_duration_secs: default_disk_cache_duration_secs(),
            max_concurrent_decodes: default_max_concurrent_decodes(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            http_timeout_secs: default_http_timeout_secs(),
            transform_placeholders: true,
            display_scale: default_display_scale(),
            bundle_root: None,
        }
    }
}

impl PipelineConfig {
    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("imgpipe.log"))
    }

    /// Returns the default disk cache lifetime.
    #[must_use]
    pub const fn disk_cache_duration(&self) -> Duration {
        Duration::from_secs(self.disk_cache_duration_secs)
    }

    /// Returns the HTTP timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml_content = r#"
            log_level = "debug"
            memory_cache_bytes = 1024
            transform_placeholders = false
        "#;

        let config: PipelineConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.memory_cache_bytes, 1024);
        assert!(!config.transform_placeholders);
        assert_eq!(config.max_concurrent_downloads, 4);
        assert_eq!(config.disk_cache_duration(), Duration::from_secs(2_592_000));
        assert!((config.display_scale - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_limit_has_floor() {
        assert!(PipelineConfig::default().max_concurrent_decodes >= 2);
    }

    #[test]
    fn test_round_trip() {
        let config = PipelineConfig {
            bundle_root: Some(PathBuf::from("/app/assets")),
            display_scale: 2.0,
            ..PipelineConfig::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
