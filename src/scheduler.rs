//! Timer service used for request retries.
//!
//! The manager only needs "run this after N ms, unless cancelled". The trait
//! keeps it independent of the runtime; [`TokioScheduler`] is the production
//! implementation.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot tasks.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `task` once after `delay`. The returned handle cancels it.
    fn schedule_after(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation handle for a scheduled task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Prevent the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token observed by the scheduler implementation.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Scheduler backed by tokio timers.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime of the calling task, if there is one.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) -> TimerHandle {
        let timer = TimerHandle::default();
        let token = timer.token.clone();
        self.handle.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    trace!("Timer cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => {
                    if !token.is_cancelled() {
                        task();
                    }
                }
            }
        });
        timer
    }
}
