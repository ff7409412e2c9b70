//! imgpipe - an asynchronous image fetch and cache pipeline.
//!
//! Requests describe where an image comes from and how it should be
//! processed. The pipeline resolves the source, consults a memory and a disk
//! cache, decodes with optional downsampling, applies transformations and
//! hands the result to a delivery target, while supporting cancellation,
//! retries and placeholders.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the pipeline engine.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, resolvers and other adapters.
pub mod infrastructure;

pub use application::{ImageService, ImageServiceBuilder, TaskHandle, WorkScheduler};
pub use domain::{ImageRequest, ImageSource, LoadError, TaskOutcome, TaskState};

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = "imgpipe";
