//! Delivery target port definition.

use std::sync::Arc;

use crate::domain::entities::{TargetId, TaskId};

/// The UI-side object that finally displays an image.
///
/// The scheduler binds each new task to its target; a target only accepts
/// results from the task it is currently bound to.
pub trait DeliveryTarget: Send + Sync {
    /// Identity used to detect two tasks aimed at the same target.
    fn target_id(&self) -> TargetId;

    /// Returns false once the target has been destroyed.
    fn is_valid(&self) -> bool;

    /// Records `task` as the one whose result this target wants.
    fn bind_task(&self, task: TaskId);

    /// Returns true if the target still wants the result of `task`.
    fn is_task_valid(&self, task: TaskId) -> bool;

    /// Returns true if `other` displays into the same place as `self`.
    fn uses_same_target(&self, other: &dyn DeliveryTarget) -> bool {
        self.target_id() == other.target_id()
    }

    /// Displays an image. Always called on the delivery context.
    fn set_image(&self, image: Arc<image::DynamicImage>, is_from_cache: bool, is_placeholder: bool);
}
