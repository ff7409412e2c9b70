//! Shared "exit tasks early" switch.

use std::sync::Arc;

use tokio::sync::watch;

/// When set, tasks that have not started decoding stop as cancelled.
#[derive(Clone)]
pub struct ExitSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExitSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ExitSignal").field(&self.is_set()).finish()
    }
}

impl ExitSignal {
    /// Creates a cleared signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns true while the switch is on.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Turns the switch on or off.
    pub fn set(&self, value: bool) {
        self.tx.send_replace(value);
    }

    /// Resolves once the switch is on.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|set| *set).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_triggered_wakes_waiters() {
        let signal = ExitSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.triggered().await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiter.is_finished());

        signal.set(true);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_set());
    }

    #[tokio::test]
    async fn test_already_set_resolves_immediately() {
        let signal = ExitSignal::new();
        signal.set(true);
        tokio::time::timeout(Duration::from_millis(100), signal.triggered())
            .await
            .unwrap();

        signal.set(false);
        assert!(!signal.is_set());
    }
}
