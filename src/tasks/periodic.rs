//! # Drift-corrected periodic task.
//!
//! A [`PeriodicTask`] invokes its callback every `period` on the executor's
//! pumps. After each invocation the next delay is `period - elapsed`, clamped to
//! `[0, period]`, so the callback's own runtime does not accumulate as drift.
//!
//! ```text
//! start(delay) ─► arm(delay) ─► fire ─► tick watchdog ─► callback
//!                    ▲                                      │
//!                    └──── arm(clamp(period - elapsed)) ◄───┘ (unless stopped)
//! ```
//!
//! ## Rules
//! - At most one timer completion is pending at any time.
//! - `start`/`stop` are idempotent (a repeated call logs a warning).
//! - A callback error or panic is fatal to the executor's current run.
//! - Scheduled completions hold a weak reference: once the last `Arc` is gone
//!   the task silently stops firing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::core::reactor::{Job, Reactor, Timer};
use crate::core::ExecutorConfig;
use crate::error::TaskError;
use crate::sync::lock;
use crate::watchdog::{PeriodicWatchdog, WatchdogManager};

/// Callback type of a periodic task.
pub type PeriodicFn = Box<dyn FnMut() -> Result<(), TaskError> + Send + 'static>;

/// Watchdog attached to a task, together with the manager it registers with.
struct Liveness {
    watchdog: Arc<PeriodicWatchdog>,
    manager: Arc<WatchdogManager>,
}

/// A callback re-invoked every `period`, created by
/// [`Executor::create_periodic_task`](crate::Executor::create_periodic_task).
///
/// Tasks are created stopped; call [`start`](Self::start) to arm them.
pub struct PeriodicTask {
    this: Weak<PeriodicTask>,
    period: Duration,
    drift_threshold: Duration,
    func: Mutex<PeriodicFn>,
    timer: Mutex<Timer>,
    stopped: AtomicBool,
    liveness: Option<Liveness>,
}

impl PeriodicTask {
    pub(crate) fn create(
        reactor: Arc<Reactor>,
        period: Duration,
        func: PeriodicFn,
        watchdogs: Option<Arc<WatchdogManager>>,
        config: &ExecutorConfig,
    ) -> Arc<Self> {
        let liveness = watchdogs.map(|manager| Liveness {
            watchdog: Arc::new(PeriodicWatchdog::new(config.watchdog_window_for(period))),
            manager,
        });
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            period,
            drift_threshold: config.drift_threshold(period),
            func: Mutex::new(func),
            timer: Mutex::new(Timer::new(reactor)),
            stopped: AtomicBool::new(true),
            liveness,
        })
    }

    /// Starts firing immediately.
    pub fn start(&self) {
        self.start_after(Duration::ZERO);
    }

    /// Starts firing after `delay`.
    ///
    /// No-op (with a warning) if the task is already running. An attached
    /// watchdog is reset and registered before the first firing is armed.
    pub fn start_after(&self, delay: Duration) {
        if self
            .stopped
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                period_ms = self.period.as_millis() as u64,
                "periodic task already started"
            );
            return;
        }
        if let Some(liveness) = &self.liveness {
            liveness.watchdog.deactivate();
            liveness.manager.register_watchdog(liveness.watchdog.clone());
        }
        debug!(
            period_ms = self.period.as_millis() as u64,
            delay_ms = delay.as_millis() as u64,
            "periodic task started"
        );
        let mut timer = lock(&self.timer);
        self.arm(&mut timer, delay);
    }

    /// Stops the task; an in-flight invocation finishes but is not rescheduled.
    ///
    /// No-op (with a warning) if the task is already stopped.
    pub fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                period_ms = self.period.as_millis() as u64,
                "periodic task already stopped"
            );
            return;
        }
        if let Some(liveness) = &self.liveness {
            liveness.manager.unregister_watchdog(&liveness.watchdog);
        }
        lock(&self.timer).cancel();
        debug!(period_ms = self.period.as_millis() as u64, "periodic task stopped");
    }

    /// Fires the pending invocation now instead of at its scheduled time.
    ///
    /// Does nothing when no invocation is pending (stopped, or currently running).
    /// The firing that follows skips drift accounting and reschedules with zero
    /// delay, after which the regular cadence resumes.
    pub fn run_now(&self) {
        let mut timer = lock(&self.timer);
        if timer.pending() > 0 {
            timer.expire_now();
            timer.async_wait(self.completion());
        }
    }

    /// Returns `true` between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.period
    }

    fn arm(&self, timer: &mut Timer, delay: Duration) {
        timer.expires_after(delay);
        timer.async_wait(self.completion());
    }

    fn completion(&self) -> Job {
        let this = self.this.clone();
        Box::new(move || match this.upgrade() {
            Some(task) => task.fire(),
            None => Ok(()),
        })
    }

    fn fire(&self) -> Result<(), TaskError> {
        let expiry = lock(&self.timer).expiry();
        let started = Instant::now();

        if let Some(expiry) = expiry {
            let deviation = started.saturating_duration_since(expiry);
            if deviation > self.drift_threshold {
                warn!(
                    deviation_us = deviation.as_micros() as u64,
                    period_ms = self.period.as_millis() as u64,
                    "periodic task fired late"
                );
            }
        }

        if let Some(liveness) = &self.liveness {
            liveness.watchdog.tick();
        }
        {
            let mut func = lock(&self.func);
            (*func)()?;
        }
        let elapsed = started.elapsed();

        let mut timer = lock(&self.timer);
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }
        let delay = match timer.expiry() {
            Some(_) => next_delay(self.period, elapsed),
            None => Duration::ZERO,
        };
        trace!(delay_us = delay.as_micros() as u64, "periodic task re-armed");
        self.arm(&mut timer, delay);
        Ok(())
    }
}

/// Delay until the next firing after an invocation that took `elapsed`.
pub(crate) fn next_delay(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed).min(period)
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(liveness) = &self.liveness {
            liveness.manager.unregister_watchdog(&liveness.watchdog);
        }
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("period", &self.period)
            .field("running", &self.is_running())
            .field("watchdog", &self.liveness.is_some())
            .finish()
    }
}
