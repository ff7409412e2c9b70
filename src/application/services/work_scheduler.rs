//! Task registry and dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ImageTask, PipelineContext};
use crate::domain::entities::{CacheKey, ImageRequest, SourceKind, TaskId, TaskOutcome, TaskState};
use crate::domain::ports::DeliveryTarget;

/// Caller side of a scheduled task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    token: CancellationToken,
    state: watch::Receiver<TaskState>,
    outcome: watch::Receiver<Option<TaskOutcome>>,
}

impl TaskHandle {
    /// Returns the task id.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the latest state of the task.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// Requests cancellation. Takes effect at the task's next checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns true once the task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Waits for the task to end and returns its outcome.
    pub async fn wait(&self) -> TaskOutcome {
        let mut outcome = self.outcome.clone();
        let finished = outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| value.clone());
        finished.unwrap_or(TaskOutcome::Cancelled)
    }
}

/// Snapshot of a live task, passed to [`WorkScheduler::cancel_all`].
#[derive(Debug, Clone, Copy)]
pub struct TaskInfo<'a> {
    /// Task id.
    pub id: TaskId,
    /// Cache key of the request.
    pub key: &'a CacheKey,
    /// Scheduling priority.
    pub priority: i32,
    /// Kind of source.
    pub source_kind: SourceKind,
    /// Current state.
    pub state: TaskState,
}

struct ActiveTask {
    target: Arc<dyn DeliveryTarget>,
    token: CancellationToken,
    key: CacheKey,
    priority: i32,
    source_kind: SourceKind,
    state: watch::Receiver<TaskState>,
}

impl ActiveTask {
    fn info(&self, id: TaskId) -> TaskInfo<'_> {
        TaskInfo {
            id,
            key: &self.key,
            priority: self.priority,
            source_kind: self.source_kind,
            state: *self.state.borrow(),
        }
    }
}

struct SchedulerInner {
    ctx: PipelineContext,
    active: Mutex<HashMap<TaskId, ActiveTask>>,
    next_id: AtomicU64,
}

/// Accepts requests, supersedes older work for the same target and runs
/// tasks on the tokio runtime.
#[derive(Clone)]
pub struct WorkScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for WorkScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkScheduler")
            .field("active", &self.active_count())
            .field("ctx", &self.inner.ctx)
            .finish()
    }
}

impl WorkScheduler {
    /// Creates a scheduler over the shared pipeline services.
    #[must_use]
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                ctx,
                active: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the shared pipeline services.
    #[must_use]
    pub fn context(&self) -> &PipelineContext {
        &self.inner.ctx
    }

    /// Starts loading `request` into `target`.
    ///
    /// Live tasks aimed at the same target are cancelled and the target is
    /// bound to the new task. Must be called within a tokio runtime.
    pub fn schedule(&self, request: ImageRequest, target: Arc<dyn DeliveryTarget>) -> TaskHandle {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(TaskState::Created);
        let (outcome_tx, outcome_rx) = watch::channel(None);

        {
            let mut active = self.inner.active.lock();
            for (other_id, other) in active.iter() {
                if !other.token.is_cancelled() && other.target.uses_same_target(target.as_ref()) {
                    debug!(task = %other_id, by = %id, "Superseding task for same target");
                    other.token.cancel();
                }
            }
            target.bind_task(id);
            active.insert(
                id,
                ActiveTask {
                    target: target.clone(),
                    token: token.clone(),
                    key: request.key().clone(),
                    priority: request.priority(),
                    source_kind: request.source().kind(),
                    state: state_rx.clone(),
                },
            );
        }

        debug!(task = %id, key = %request.key(), priority = request.priority(), "Scheduled image task");

        let task = ImageTask::new(
            id,
            request,
            target,
            self.inner.ctx.clone(),
            token.clone(),
            state_tx,
        );
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = task.run().await;
            inner.active.lock().remove(&id);
            outcome_tx.send_replace(Some(outcome));
        });

        TaskHandle {
            id,
            token,
            state: state_rx,
            outcome: outcome_rx,
        }
    }

    /// Cancels the task behind `handle`.
    pub fn cancel(&self, handle: &TaskHandle) {
        handle.cancel();
    }

    /// Cancels every live task matching `predicate`. Returns how many were
    /// cancelled.
    pub fn cancel_all(&self, predicate: impl Fn(&TaskInfo<'_>) -> bool) -> usize {
        let active = self.inner.active.lock();
        let mut count = 0;
        for (id, task) in active.iter() {
            if !task.token.is_cancelled() && predicate(&task.info(*id)) {
                task.token.cancel();
                count += 1;
            }
        }
        if count > 0 {
            debug!(count, "Cancelled image tasks");
        }
        count
    }

    /// Cancels every live task.
    pub fn cancel_everything(&self) -> usize {
        self.cancel_all(|_| true)
    }

    /// Turns the exit-early switch on or off. While on, tasks that have not
    /// started decoding end as cancelled without further work.
    pub fn set_exit_tasks_early(&self, exit: bool) {
        debug!(exit, "Exit tasks early");
        self.inner.ctx.exit.set(exit);
    }

    /// Returns the state of the exit-early switch.
    #[must_use]
    pub fn exit_tasks_early(&self) -> bool {
        self.inner.ctx.exit.is_set()
    }

    /// Returns how many tasks have not ended yet.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }
}
