//! Domain entity definitions.

mod cache_key;
mod image;
mod request;
mod task;

pub use cache_key::{CacheKey, digest_str};
pub use image::{CachedImage, ImageInformation, LoadedImage, LoadingResult};
pub use request::{
    CacheType, Callbacks, DownsampleSize, DownsampleUnits, ErrorCallback, FinishCallback,
    ImageRequest, ImageRequestBuilder, ImageSource, InterpolationMode, LoadingPriority,
    SourceKind, StreamProducer, SuccessCallback,
};
pub use task::{TargetId, TaskId, TaskOutcome, TaskState};
