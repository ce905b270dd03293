//! # Start/finish watchdog for bounded one-off operations.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use super::Watchdog;
use super::clock;

/// Models "an operation began at `tick` and must complete by `tick + window`".
///
/// While the operation is in flight (`tock < tick`) it is measured against the
/// checking instant; once completed it is measured against its own completion
/// time. The two timestamps are read independently, so a check racing a
/// `tick`/`tock` may observe either ordering.
///
/// A `tick` is never recorded at or before the last `tock`: on a coarse clock
/// it is stored as `tock + 1ns`, so a restarted operation always reads as in
/// flight rather than as already completed.
///
/// # Example
/// ```
/// use std::time::{Duration, Instant};
/// use tickvisor::{IntervalWatchdog, Watchdog};
///
/// let wd = IntervalWatchdog::new(Duration::from_millis(50));
/// wd.tick();
/// assert!(wd.check(Instant::now()));
/// assert!(!wd.check(Instant::now() + Duration::from_secs(1)));
///
/// wd.tock();
/// assert!(wd.check(Instant::now() + Duration::from_secs(1)));
/// ```
#[derive(Debug)]
pub struct IntervalWatchdog {
    window: Duration,
    tick: AtomicI64,
    tock: AtomicI64,
}

impl IntervalWatchdog {
    /// Creates a watchdog with no pending obligation.
    pub fn new(window: Duration) -> Self {
        let now = clock::now_nanos();
        Self {
            window,
            tick: AtomicI64::new(now),
            tock: AtomicI64::new(now),
        }
    }

    /// Marks the start of the guarded operation.
    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    /// Marks the completion of the guarded operation.
    pub fn tock(&self) {
        self.tock_at(Instant::now());
    }

    pub(crate) fn tick_at(&self, at: Instant) {
        // A new operation starts strictly after the previous completion.
        let floor = self.tock.load(Ordering::Relaxed).saturating_add(1);
        self.tick.store(clock::to_nanos(at).max(floor), Ordering::Relaxed);
    }

    pub(crate) fn tock_at(&self, at: Instant) {
        self.tock.store(clock::to_nanos(at), Ordering::Relaxed);
    }

    /// Clears any pending obligation (both timestamps become "now").
    pub fn deactivate(&self) {
        let now = clock::now_nanos();
        self.tick.store(now, Ordering::Relaxed);
        self.tock.store(now, Ordering::Relaxed);
    }

    /// Returns the liveness window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Watchdog for IntervalWatchdog {
    fn check(&self, now: Instant) -> bool {
        let tick = self.tick.load(Ordering::Relaxed);
        let tock = self.tock.load(Ordering::Relaxed);
        let end = if tock >= tick { tock } else { clock::to_nanos(now) };
        i128::from(end) - i128::from(tick) <= clock::window_nanos(self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test]
    fn new_watchdog_has_no_obligation() {
        let wd = IntervalWatchdog::new(WINDOW);
        assert!(wd.check(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn in_flight_operation_is_measured_against_now() {
        let wd = IntervalWatchdog::new(WINDOW);
        let t0 = Instant::now() + Duration::from_millis(1);
        wd.tick_at(t0);

        assert!(wd.check(t0 + WINDOW));
        assert!(!wd.check(t0 + WINDOW + Duration::from_nanos(1)));
    }

    #[test]
    fn completed_operation_is_measured_against_completion() {
        let wd = IntervalWatchdog::new(WINDOW);
        let t0 = Instant::now() + Duration::from_millis(1);
        wd.tick_at(t0);
        wd.tock_at(t0 + WINDOW / 2);
        assert!(wd.check(t0 + WINDOW * 100));

        let late = IntervalWatchdog::new(WINDOW);
        late.tick_at(t0);
        late.tock_at(t0 + WINDOW * 2);
        assert!(!late.check(t0 + WINDOW * 2));
    }

    #[test]
    fn deactivate_clears_pending_obligation() {
        let wd = IntervalWatchdog::new(WINDOW);
        let t0 = Instant::now() + Duration::from_millis(1);
        wd.tick_at(t0);
        assert!(!wd.check(t0 + WINDOW * 3));

        wd.deactivate();
        assert!(wd.check(Instant::now() + WINDOW * 3));
    }

    #[test]
    fn tick_at_the_last_tock_still_reads_in_flight() {
        let wd = IntervalWatchdog::new(WINDOW);
        let t0 = Instant::now() + Duration::from_millis(1);
        wd.tick_at(t0);
        wd.tock_at(t0 + WINDOW / 2);

        // Same instant as the completion: the new tick lands just after it.
        wd.tick_at(t0 + WINDOW / 2);
        assert!(wd.check(t0 + WINDOW));
        assert!(!wd.check(t0 + WINDOW * 2));
    }
}
