//! Simulated-time timer service.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ports::{Scheduler, TimerCallback, TimerHandle};

struct ScheduledTimer {
    cancelled: Arc<AtomicBool>,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualState {
    elapsed: Duration,
    next_seq: u64,
    /// Keyed by (deadline, scheduling order).
    queue: BTreeMap<(Duration, u64), ScheduledTimer>,
}

/// Scheduler driven by an explicit virtual clock.
///
/// Nothing fires until [`ManualScheduler::advance`] is called; timers then
/// fire in deadline order (scheduling order for equal deadlines), each on the
/// caller of `advance`.
pub struct ManualScheduler {
    origin: Instant,
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Virtual time since creation.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Timers scheduled and not cancelled.
    pub fn pending_timers(&self) -> usize {
        self.state
            .lock()
            .queue
            .values()
            .filter(|timer| !timer.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Move the clock forward, firing every timer that falls due.
    ///
    /// Timers scheduled by a firing callback also fire if they fall due
    /// within the same advance. Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().elapsed + by;
        let mut fired = 0;

        loop {
            let next = {
                let mut state = self.state.lock();
                let due = matches!(
                    state.queue.first_key_value(),
                    Some((&(deadline, _), _)) if deadline <= target
                );
                if due {
                    state.queue.pop_first().map(|((deadline, _), timer)| {
                        state.elapsed = state.elapsed.max(deadline);
                        timer
                    })
                } else {
                    None
                }
            };

            // Run outside the lock: callbacks may schedule again.
            match next {
                Some(timer) => {
                    if !timer.cancelled.load(Ordering::SeqCst) {
                        (timer.callback)();
                        fired += 1;
                    }
                }
                None => break,
            }
        }

        let mut state = self.state.lock();
        state.elapsed = state.elapsed.max(target);
        fired
    }

    /// Fire timers already due (zero-delay timers) without moving the clock.
    pub fn fire_due(&self) -> usize {
        self.advance(Duration::ZERO)
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.lock();
        let deadline = state.elapsed + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.insert(
            (deadline, seq),
            ScheduledTimer {
                cancelled: handle.flag(),
                callback,
            },
        );
        handle
    }

    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}
