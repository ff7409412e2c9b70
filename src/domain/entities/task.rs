//! Task identity, lifecycle state and outcome.

use super::image::LoadedImage;
use crate::domain::errors::LoadError;

/// Identifier of a scheduled task. Increases monotonically, so it also
/// records arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a delivery target, used to detect superseded requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(uuid::Uuid);

impl TargetId {
    /// Creates a fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an image task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Bound to a target, not yet started.
    #[default]
    Created,
    /// Looking up the memory cache.
    CacheProbe,
    /// Served from the memory cache.
    HitDelivered,
    /// Waiting on the source resolver or disk cache.
    ResolvePending,
    /// Converting bytes into a bitmap.
    Decoding,
    /// Applying transformations.
    Transforming,
    /// Caching and handing the image to the target.
    Delivering,
    /// Image delivered.
    Completed,
    /// Loading failed.
    Failed,
    /// Cancelled or superseded.
    Cancelled,
    /// The target no longer wants this task's result.
    InvalidTarget,
}

impl TaskState {
    /// Returns true for states the task never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::InvalidTarget
        )
    }

    /// Returns true once decode work has started or finished.
    #[must_use]
    pub const fn has_started_decoding(self) -> bool {
        matches!(
            self,
            Self::Decoding | Self::Transforming | Self::Delivering | Self::Completed
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::CacheProbe => "cache-probe",
            Self::HitDelivered => "hit-delivered",
            Self::ResolvePending => "resolve-pending",
            Self::Decoding => "decoding",
            Self::Transforming => "transforming",
            Self::Delivering => "delivering",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::InvalidTarget => "invalid-target",
        };
        f.write_str(name)
    }
}

/// Final result of a task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The image was delivered to the target.
    Completed(LoadedImage),
    /// Loading failed after exhausting retries.
    Failed(LoadError),
    /// The task was cancelled, superseded or told to exit early.
    Cancelled,
    /// The target was rebound or destroyed before delivery.
    InvalidTarget,
}

impl TaskOutcome {
    /// Returns the terminal state matching this outcome.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        match self {
            Self::Completed(_) => TaskState::Completed,
            Self::Failed(_) => TaskState::Failed,
            Self::Cancelled => TaskState::Cancelled,
            Self::InvalidTarget => TaskState::InvalidTarget,
        }
    }

    /// Returns the loaded image on success.
    #[must_use]
    pub const fn image(&self) -> Option<&LoadedImage> {
        match self {
            Self::Completed(loaded) => Some(loaded),
            _ => None,
        }
    }

    /// Returns true if the image was delivered.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns true if the task was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the error if loading failed.
    #[must_use]
    pub const fn error(&self) -> Option<&LoadError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::InvalidTarget.is_terminal());
        assert!(!TaskState::Decoding.is_terminal());
        assert!(!TaskState::Created.is_terminal());
    }

    #[test]
    fn test_outcome_state_mapping() {
        assert_eq!(TaskOutcome::Cancelled.state(), TaskState::Cancelled);
        assert_eq!(
            TaskOutcome::Failed(LoadError::not_found("x")).state(),
            TaskState::Failed
        );
    }

    #[test]
    fn test_target_ids_are_unique() {
        assert_ne!(TargetId::new(), TargetId::new());
    }
}
