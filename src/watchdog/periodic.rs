//! # Single-timestamp watchdog for recurring work.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use super::Watchdog;
use super::clock;

/// Healthy while inactive, or while the last [`tick`](Self::tick) is no older
/// than the window.
///
/// A new watchdog is inactive: it starts monitoring on the first tick and can
/// be put back to sleep with [`deactivate`](Self::deactivate), so a dormant
/// task is never reported unhealthy.
///
/// # Example
/// ```
/// use std::time::{Duration, Instant};
/// use tickvisor::{PeriodicWatchdog, Watchdog};
///
/// let wd = PeriodicWatchdog::new(Duration::from_millis(20));
/// wd.tick();
/// assert!(wd.check(Instant::now()));
/// assert!(!wd.check(Instant::now() + Duration::from_secs(1)));
///
/// wd.deactivate();
/// assert!(wd.check(Instant::now() + Duration::from_secs(1)));
/// ```
#[derive(Debug)]
pub struct PeriodicWatchdog {
    window: Duration,
    tick: AtomicI64,
    active: AtomicBool,
}

impl PeriodicWatchdog {
    /// Creates an inactive watchdog with the given liveness window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            tick: AtomicI64::new(clock::NEVER),
            active: AtomicBool::new(false),
        }
    }

    /// Records proof of life now and activates the watchdog.
    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    /// Records proof of life at `at` and activates the watchdog.
    pub(crate) fn tick_at(&self, at: Instant) {
        self.tick.store(clock::to_nanos(at), Ordering::Relaxed);
        self.active.store(true, Ordering::Relaxed);
    }

    /// Stops monitoring until the next tick.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Returns whether the watchdog is currently monitoring.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Returns the time of the last tick, if any.
    pub fn last_tick(&self) -> Option<Instant> {
        match self.tick.load(Ordering::Relaxed) {
            clock::NEVER => None,
            nanos => Some(clock::from_nanos(nanos)),
        }
    }

    /// Returns the liveness window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Watchdog for PeriodicWatchdog {
    fn check(&self, now: Instant) -> bool {
        if !self.active.load(Ordering::Relaxed) {
            return true;
        }
        let tick = self.tick.load(Ordering::Relaxed);
        if tick == clock::NEVER {
            return true;
        }
        let elapsed = i128::from(clock::to_nanos(now)) - i128::from(tick);
        elapsed <= clock::window_nanos(self.window)
    }
}
