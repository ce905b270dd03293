//! # Liveness watchdogs.
//!
//! A watchdog records proof of life and answers whether too much time has
//! passed without one. Two variants share the [`Watchdog`] capability:
//!
//! - [`PeriodicWatchdog`] - "still alive if ticked within the window";
//!   attached to periodic tasks.
//! - [`IntervalWatchdog`] - "an operation started at `tick` must finish within
//!   the window"; wraps one-off spawned/posted jobs.
//!
//! [`WatchdogManager`] keeps the registered set and checks all of them against
//! one timestamp snapshot.
//!
//! ```text
//! PeriodicTask ──tick()──► PeriodicWatchdog ─┐
//! spawn/post  ──tick()──► IntervalWatchdog ──┼──► WatchdogManager::check() ──► bool
//!                                            ┘          (all-of, one `now`)
//! ```
//!
//! ## Rules
//! - `check` is lock-free for a single watchdog (relaxed atomics).
//! - The manager serializes register/unregister/check with one mutex.

mod clock;
mod interval;
mod manager;
mod periodic;

use std::time::Instant;

pub use interval::IntervalWatchdog;
pub use manager::WatchdogManager;
pub use periodic::PeriodicWatchdog;

/// A liveness sentinel.
///
/// Implementations must be cheap and must not block: the manager calls
/// `check` for every registered watchdog while holding its lock.
pub trait Watchdog: Send + Sync + 'static {
    /// Returns `true` when the watchdog is healthy at `now`.
    fn check(&self, now: Instant) -> bool;
}
