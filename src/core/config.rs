//! # Executor configuration.
//!
//! Provides [`ExecutorConfig`], the tuning knobs of an [`Executor`](crate::Executor).
//!
//! Config is used in two ways:
//! 1. **Executor creation**: `Executor::with_config(config)`
//! 2. **Periodic task creation**: drift threshold and watchdog window are derived
//!    from the task period when `create_periodic_task` is called.
//!
//! ## Sentinel values
//! - `drift_tolerance <= 0` (or NaN) → every late firing is reported
//! - `watchdog_window <= 0` (or NaN) → zero window (any gap between ticks fails)

use std::time::Duration;

/// Configuration for the executor runtime.
///
/// ## Field semantics
/// - `drift_tolerance`: fraction of the period a firing may lag before a warning
/// - `watchdog_window`: periodic-task watchdog window, as a multiple of the period
/// - `thread_name`: prefix of worker thread names (`{thread_name}-{index}`)
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Lateness (relative to the period) above which a drift warning is logged.
    ///
    /// The default `0.001` reports firings more than 0.1% of a period late.
    pub drift_tolerance: f64,

    /// Window of a periodic task's watchdog, in periods.
    ///
    /// The default `2.0` tolerates one skipped firing.
    pub watchdog_window: f64,

    /// Name prefix for worker threads started by `run`.
    pub thread_name: String,
}

impl ExecutorConfig {
    /// Lateness above which a firing of a task with `period` is reported.
    #[inline]
    pub fn drift_threshold(&self, period: Duration) -> Duration {
        scale(period, self.drift_tolerance)
    }

    /// Watchdog window for a periodic task with `period`.
    #[inline]
    pub fn watchdog_window_for(&self, period: Duration) -> Duration {
        scale(period, self.watchdog_window)
    }

    #[inline]
    pub(crate) fn worker_name(&self, index: usize) -> String {
        format!("{}-{index}", self.thread_name)
    }
}

impl Default for ExecutorConfig {
    /// Default configuration:
    ///
    /// - `drift_tolerance = 0.001`
    /// - `watchdog_window = 2.0`
    /// - `thread_name = "tickvisor-worker"`
    fn default() -> Self {
        Self {
            drift_tolerance: 0.001,
            watchdog_window: 2.0,
            thread_name: "tickvisor-worker".to_string(),
        }
    }
}

fn scale(period: Duration, factor: f64) -> Duration {
    if factor.is_nan() || factor <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(period.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
