//! Serial delivery context.
//!
//! Every `set_image` call and every completion callback runs on one
//! consumer task, in the order it was posted.

use std::panic::AssertUnwindSafe;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace};

type Job = Box<dyn FnOnce() + Send>;

/// Handle to the delivery context. Cheap to clone.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for DeliveryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryDispatcher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl DeliveryDispatcher {
    /// Starts the consumer task on the current tokio runtime.
    #[must_use]
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::run(rx));
        Self { tx }
    }

    async fn run(mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(job)) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %message, "Delivery job panicked");
            }
        }
        trace!("Delivery dispatcher stopped");
    }

    /// Queues `job` without waiting for it. Returns false if the context has
    /// shut down.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }

    /// Queues `job` and waits for its result.
    /// Returns None if the context has shut down or the job panicked.
    pub async fn post_async<R: Send + 'static>(
        &self,
        job: impl FnOnce() -> R + Send + 'static,
    ) -> Option<R> {
        let (tx, rx) = oneshot::channel();
        let posted = self.post(move || {
            let _ = tx.send(job());
        });
        if !posted {
            return None;
        }
        rx.await.ok()
    }
}
