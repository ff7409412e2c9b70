//! Admission control for decode work.
//!
//! At most `max_concurrent` tasks hold a [`DecodePermit`] at once. Waiters
//! are served by descending priority, then by arrival.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

struct Waiter {
    priority: i32,
    arrival: u64,
    tx: oneshot::Sender<DecodePermit>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.arrival == other.arrival
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.arrival.cmp(&self.arrival))
    }
}

#[derive(Default)]
struct GateState {
    running: usize,
    waiters: BinaryHeap<Waiter>,
}

/// Limits how many tasks decode at the same time.
#[derive(Clone)]
pub struct DecodeGate {
    state: Arc<Mutex<GateState>>,
    max_concurrent: usize,
}

impl std::fmt::Debug for DecodeGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeGate")
            .field("max_concurrent", &self.max_concurrent)
            .field("running", &self.running())
            .field("waiting", &self.waiting())
            .finish()
    }
}

impl DecodeGate {
    /// Creates a gate admitting `max_concurrent` decodes (at least one).
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::default())),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Returns the admission limit.
    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Returns how many permits are held.
    #[must_use]
    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    /// Returns how many tasks wait for a permit.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Waits for a decode slot.
    ///
    /// Dropping the returned future gives up the place in the queue. Returns
    /// None if the request was dropped without being served.
    pub async fn acquire(&self, priority: i32, arrival: u64) -> Option<DecodePermit> {
        let rx = {
            let mut state = self.state.lock();
            if state.running < self.max_concurrent && state.waiters.is_empty() {
                state.running += 1;
                return Some(DecodePermit::armed(self.state.clone()));
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(Waiter {
                priority,
                arrival,
                tx,
            });
            trace!(priority, arrival, waiting = state.waiters.len(), "Queued for decode");
            rx
        };
        rx.await.ok()
    }
}

/// A held decode slot. Dropping it admits the next waiter.
pub struct DecodePermit {
    state: Option<Arc<Mutex<GateState>>>,
}

impl DecodePermit {
    fn armed(state: Arc<Mutex<GateState>>) -> Self {
        Self { state: Some(state) }
    }
}

impl std::fmt::Debug for DecodePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePermit")
            .field("armed", &self.state.is_some())
            .finish()
    }
}

impl Drop for DecodePermit {
    fn drop(&mut self) {
        let Some(gate) = self.state.take() else {
            return;
        };
        let mut state = gate.lock();
        // The slot moves to the next live waiter; waiters that gave up hand
        // the permit back and it is disarmed.
        while let Some(waiter) = state.waiters.pop() {
            match waiter.tx.send(Self::armed(gate.clone())) {
                Ok(()) => return,
                Err(mut unclaimed) => unclaimed.state = None,
            }
        }
        state.running -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for_waiters(gate: &DecodeGate, count: usize) {
        for _ in 0..200 {
            if gate.waiting() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {count} waiters, found {}", gate.waiting());
    }

    #[tokio::test]
    async fn test_admits_up_to_limit() {
        let gate = DecodeGate::new(2);
        let a = gate.acquire(0, 1).await.unwrap();
        let _b = gate.acquire(0, 2).await.unwrap();
        assert_eq!(gate.running(), 2);

        let g = gate.clone();
        let third = tokio::spawn(async move { g.acquire(0, 3).await.is_some() });
        wait_for_waiters(&gate, 1).await;

        drop(a);
        assert!(third.await.unwrap());
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn test_priority_then_arrival() {
        let gate = DecodeGate::new(1);
        let held = gate.acquire(0, 0).await.unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for (priority, arrival) in [(0, 1), (5, 2), (0, 3), (5, 4)] {
            let g = gate.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let permit = g.acquire(priority, arrival).await.unwrap();
                order.lock().push(arrival);
                drop(permit);
            }));
            wait_for_waiters(&gate, handles.len()).await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![2, 4, 1, 3]);
        assert_eq!(gate.running(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_leak_slot() {
        let gate = DecodeGate::new(1);
        let held = gate.acquire(0, 0).await.unwrap();

        let g = gate.clone();
        let abandoned = tokio::spawn(async move { g.acquire(0, 1).await });
        wait_for_waiters(&gate, 1).await;
        abandoned.abort();
        let _ = abandoned.await;

        drop(held);
        assert_eq!(gate.running(), 0);
        assert!(gate.acquire(0, 2).await.is_some());
    }
}
