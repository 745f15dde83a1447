//! Timer service port.
//!
//! Timeouts are scheduled callbacks, never blocked threads. The scheduler is
//! injected so timeout paths can be driven by a simulated clock in tests.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// Schedules cancellable one-shot callbacks.
pub trait Scheduler: Send + Sync {
    /// Run `callback` once `delay` has elapsed, unless the handle is cancelled first.
    ///
    /// Implementations must not run the callback on the caller's stack.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Current time on the scheduler's clock.
    fn now(&self) -> Instant;
}

/// Handle of a scheduled timer.
///
/// Dropping the handle does not cancel the timer; call `cancel`.
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    on_cancel: Option<CancelFn>,
}

impl TimerHandle {
    /// Handle whose cancellation is only visible through [`TimerHandle::flag`].
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            on_cancel: None,
        }
    }

    /// Additionally run `on_cancel` when cancelled, e.g. to abort a task.
    pub fn with_cancel_action(mut self, on_cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Box::new(on_cancel));
        self
    }

    /// Shared flag the scheduler checks before running the callback.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Cancel the timer. Idempotent.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
