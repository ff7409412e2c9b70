//! Delivery context and in-memory targets.

mod dispatcher;
mod slot;

pub use dispatcher::DeliveryDispatcher;
pub use slot::{DetachedTarget, Delivery, ImageSlot};
