//! Tokio-backed timer service.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, TryCurrentError};

use crate::ports::{Scheduler, TimerCallback, TimerHandle};

/// Runs each timer as a sleeping task on a tokio runtime.
///
/// Honors tokio's paused clock, so `tokio::time::pause` makes timeouts
/// deterministic in tests.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Scheduler on the runtime of the calling context.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::new();
        let cancelled = handle.flag();

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !cancelled.load(Ordering::SeqCst) {
                callback();
            }
        });

        let abort = task.abort_handle();
        handle.with_cancel_action(move || abort.abort())
    }

    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}
