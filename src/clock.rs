//! The global tick clock.
//!
//! A single producer thread sleeps one tick period, increments the counter
//! under a lock, and broadcasts to every waiter. All time in the emulator is
//! expressed in ticks, which decouples execution speed from real time during
//! testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use crate::types::Tick;

/// Wall-clock duration of one tick, in milliseconds.
pub const TICK_DURATION_MS: u64 = 10;

/// Monotonic tick counter with condvar broadcast.
///
/// Ticks only ever increase by one and are never skipped. Waiters block
/// until the counter is strictly greater than the value they last observed,
/// or until the runtime's stop flag is raised.
pub struct TickClock {
    tick: Mutex<Tick>,
    tick_cv: Condvar,
}

impl TickClock {
    pub fn new() -> Self {
        TickClock {
            tick: Mutex::new(0),
            tick_cv: Condvar::new(),
        }
    }

    /// Current tick.
    pub fn now(&self) -> Tick {
        *self.tick.lock().unwrap()
    }

    /// Advance by one and wake all waiters. Producer-only.
    pub fn advance(&self) -> Tick {
        let current = {
            let mut tick = self.tick.lock().unwrap();
            *tick += 1;
            *tick
        };
        self.tick_cv.notify_all();
        current
    }

    /// Block until the tick is strictly greater than `last`, or `stop` is
    /// raised. Returns the tick observed on wakeup.
    pub fn wait_past(&self, last: Tick, stop: &AtomicBool) -> Tick {
        let mut tick = self.tick.lock().unwrap();
        while *tick <= last && !stop.load(Ordering::Acquire) {
            tick = self.tick_cv.wait(tick).unwrap();
        }
        *tick
    }

    /// Wake all waiters without advancing. Called after raising the stop
    /// flag so blocked workers re-check it.
    pub fn kick(&self) {
        let _guard = self.tick.lock().unwrap();
        self.tick_cv.notify_all();
    }

}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}
