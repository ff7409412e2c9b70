//! In-memory delivery targets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::domain::entities::{TargetId, TaskId};
use crate::domain::ports::DeliveryTarget;

const UNBOUND: u64 = 0;

/// One image handed to a target.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The displayed image.
    pub image: Arc<image::DynamicImage>,
    /// Whether the image came straight from the memory cache.
    pub from_cache: bool,
    /// Whether the image is a loading or error placeholder.
    pub placeholder: bool,
}

/// A delivery target that keeps what it was given.
///
/// Stands in for a view in headless hosts and tests. A slot is bound to the
/// latest task scheduled for it and ignores everything else.
#[derive(Debug)]
pub struct ImageSlot {
    id: TargetId,
    bound: AtomicU64,
    alive: AtomicBool,
    deliveries: Mutex<Vec<Delivery>>,
}

impl Default for ImageSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: TargetId::new(),
            bound: AtomicU64::new(UNBOUND),
            alive: AtomicBool::new(true),
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// Marks the slot as destroyed. Pending tasks end as invalid target.
    pub fn detach(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Returns the task the slot is bound to.
    #[must_use]
    pub fn bound_task(&self) -> Option<TaskId> {
        match self.bound.load(Ordering::SeqCst) {
            UNBOUND => None,
            id => Some(TaskId(id)),
        }
    }

    /// Returns the image currently displayed.
    #[must_use]
    pub fn current(&self) -> Option<Delivery> {
        self.deliveries.lock().last().cloned()
    }

    /// Returns every image displayed so far, oldest first.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }
}

impl DeliveryTarget for ImageSlot {
    fn target_id(&self) -> TargetId {
        self.id
    }

    fn is_valid(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn bind_task(&self, task: TaskId) {
        self.bound.store(task.0, Ordering::SeqCst);
    }

    fn is_task_valid(&self, task: TaskId) -> bool {
        self.is_valid() && self.bound.load(Ordering::SeqCst) == task.0
    }

    fn set_image(&self, image: Arc<image::DynamicImage>, is_from_cache: bool, is_placeholder: bool) {
        self.deliveries.lock().push(Delivery {
            image,
            from_cache: is_from_cache,
            placeholder: is_placeholder,
        });
    }
}

/// Target that accepts every result and displays nothing. Used for preloads.
#[derive(Debug, Default)]
pub struct DetachedTarget {
    id: TargetId,
}

impl DetachedTarget {
    /// Creates a detached target with its own identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeliveryTarget for DetachedTarget {
    fn target_id(&self) -> TargetId {
        self.id
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn bind_task(&self, _task: TaskId) {}

    fn is_task_valid(&self, _task: TaskId) -> bool {
        true
    }

    fn set_image(&self, _image: Arc<image::DynamicImage>, _is_from_cache: bool, _is_placeholder: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_bound_task_is_valid() {
        let slot = ImageSlot::new();
        assert_eq!(slot.bound_task(), None);

        slot.bind_task(TaskId(1));
        assert!(slot.is_task_valid(TaskId(1)));

        slot.bind_task(TaskId(2));
        assert!(!slot.is_task_valid(TaskId(1)));
        assert!(slot.is_task_valid(TaskId(2)));
    }

    #[test]
    fn test_detached_slot_rejects_everything() {
        let slot = ImageSlot::new();
        slot.bind_task(TaskId(3));
        slot.detach();

        assert!(!slot.is_valid());
        assert!(!slot.is_task_valid(TaskId(3)));
    }

    #[test]
    fn test_same_target_by_identity() {
        let a = ImageSlot::new();
        let b = ImageSlot::new();
        assert!(a.uses_same_target(&a));
        assert!(!a.uses_same_target(&b));
    }

    #[test]
    fn test_records_deliveries() {
        let slot = ImageSlot::new();
        let img = Arc::new(image::DynamicImage::new_rgb8(2, 2));
        slot.set_image(img.clone(), false, true);
        slot.set_image(img, true, false);

        let all = slot.deliveries();
        assert_eq!(all.len(), 2);
        assert!(all[0].placeholder);
        assert!(slot.current().unwrap().from_cache);
    }
}
