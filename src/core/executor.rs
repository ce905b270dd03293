//! # Executor: multi-threaded run loop, job submission and liveness reporting.
//!
//! The [`Executor`] owns a reactor, a [`WatchdogManager`] and the slot for the
//! first failure of the current run. User code submits work with
//! [`spawn`](Executor::spawn), [`post`](Executor::post) and
//! [`create_periodic_task`](Executor::create_periodic_task), then blocks in
//! [`run`](Executor::run).
//!
//! ## High-level architecture
//! ```text
//! run(threads, signals):
//!   running: false ─► true           (else warn + Err(AlreadyRunning))
//!   SignalListener::start(signals)   (registrations before any job runs)
//!   std::thread::scope
//!     ├─► "{thread_name}-0" ─► pump ─┐
//!     ├─► ...                        ├─► reactor.run() under catch_unwind
//!     ├─► "{thread_name}-N" ─► pump ─┤      Err / panic:
//!     └─► calling thread   ─► pump ─┘        error!, reactor.stop(),
//!                                             first failure stored
//!   join all ─► drop listener ─► clear queued signals ─► running: false
//!   stored failure? ─► Err(TaskFailed) : Ok(())
//! ```
//!
//! ## Job liveness
//! Every spawned or posted job is guarded by an [`IntervalWatchdog`] with the
//! caller's timeout: ticked and registered at submission, tocked and
//! unregistered when the job finishes or is discarded.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tickvisor::Executor;
//!
//! let executor = Executor::new();
//! let answer = executor.post(Duration::from_secs(1), || Ok(6 * 7));
//! executor.spawn(Duration::from_secs(1), || Ok(()));
//!
//! // The loop returns once there is no work left.
//! executor.run(0, &[]).unwrap();
//! assert_eq!(answer.wait(), Ok(42));
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::config::ExecutorConfig;
use super::reactor::Reactor;
use super::signals::SignalListener;
use crate::error::{RuntimeError, TaskError};
use crate::sync::lock;
use crate::tasks::{JobHandle, PeriodicTask};
use crate::watchdog::{IntervalWatchdog, WatchdogManager};

/// Multi-threaded executor for jobs, periodic tasks and signal handlers.
pub struct Executor {
    config: ExecutorConfig,
    reactor: Arc<Reactor>,
    watchdogs: Arc<WatchdogManager>,
    failure: Mutex<Option<TaskError>>,
    watchdog_task: Mutex<Option<Arc<PeriodicTask>>>,
    running: AtomicBool,
}

/// Cloneable handle that can stop an executor from any thread or job.
#[derive(Clone)]
pub struct ExecutorHandle {
    reactor: Arc<Reactor>,
}

/// Interval watchdog guarding one spawned or posted job.
struct JobWatch {
    watchdog: Arc<IntervalWatchdog>,
    manager: Arc<WatchdogManager>,
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        self.watchdog.tock();
        self.manager.unregister_watchdog(&self.watchdog);
    }
}

/// Resets the running flag on every exit path of `run`.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Executor {
    /// Creates an executor with [`ExecutorConfig::default`].
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    /// Creates an executor with the given configuration.
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self {
            config,
            reactor: Arc::new(Reactor::new()),
            watchdogs: Arc::new(WatchdogManager::new()),
            failure: Mutex::new(None),
            watchdog_task: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// The configuration this executor was built with.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The manager every job and watchdog-enabled task registers with.
    pub fn watchdogs(&self) -> &Arc<WatchdogManager> {
        &self.watchdogs
    }

    /// Returns a handle that can stop this executor from elsewhere.
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            reactor: Arc::clone(&self.reactor),
        }
    }

    /// Pumps the loop on `threads` worker threads plus the calling thread.
    ///
    /// Blocks until the loop is stopped or runs out of work. While running,
    /// deliveries of any signal in `signals` complete pending signal handlers.
    ///
    /// # Errors
    /// - [`RuntimeError::AlreadyRunning`] if another `run` is active;
    /// - [`RuntimeError::Signal`] if a signal cannot be registered;
    /// - [`RuntimeError::WorkerSpawn`] if the OS refuses a worker thread;
    /// - [`RuntimeError::TaskFailed`] with the first failure any pump observed.
    pub fn run(&self, threads: usize, signals: &[i32]) -> Result<(), RuntimeError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("executor already running");
            return Err(RuntimeError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);
        *lock(&self.failure) = None;

        let listener = SignalListener::start(Arc::clone(&self.reactor), signals)?;
        info!(threads, signals = signals.len(), "executor started");

        let spawned = thread::scope(|scope| {
            for index in 0..threads {
                let worker = thread::Builder::new()
                    .name(self.config.worker_name(index))
                    .spawn_scoped(scope, move || self.pump());
                if let Err(source) = worker {
                    error!(error = %source, index, "failed to spawn worker thread");
                    self.reactor.stop();
                    return Err(RuntimeError::WorkerSpawn { source });
                }
            }
            self.pump();
            Ok(())
        });

        drop(listener);
        self.reactor.clear_signals();
        info!("executor finished");

        match lock(&self.failure).take() {
            Some(source) => Err(RuntimeError::TaskFailed { source }),
            None => spawned,
        }
    }

    fn pump(&self) {
        let error = match panic::catch_unwind(AssertUnwindSafe(|| self.reactor.run())) {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error,
            Err(payload) => TaskError::from_panic(payload),
        };
        error!(error = %error, label = error.as_label(), "executor stopped by task failure");
        self.reactor.stop();

        let mut failure = lock(&self.failure);
        if failure.is_none() {
            *failure = Some(error);
        }
    }

    /// Asks every pump to return once its current job finishes.
    ///
    /// Safe from any thread, including from inside a job. Sticky until
    /// [`restart`](Self::restart).
    pub fn stop(&self) {
        self.reactor.stop();
        info!("executor stop requested");
    }

    /// Clears the stopped state so `run` can pump again.
    ///
    /// Ignored while a `run` is active.
    pub fn restart(&self) {
        if self.running.load(Ordering::Acquire) {
            debug!("restart ignored while running");
            return;
        }
        self.reactor.restart();
    }

    /// Returns `true` once the loop was stopped or ran out of work.
    pub fn stopped(&self) -> bool {
        self.reactor.stopped()
    }

    /// Queues `func` to run once on any pump.
    ///
    /// An error or panic escaping `func` is fatal to the current run. The job
    /// is guarded by an interval watchdog with window `timeout`.
    pub fn spawn<F>(&self, timeout: Duration, func: F)
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        let watch = self.watch_job(timeout);
        self.reactor.post(Box::new(move || {
            let _watch = watch;
            func()
        }));
    }

    /// Queues `func` and returns a handle to its result.
    ///
    /// Errors and panics of `func` are delivered through the handle. If the
    /// handle was dropped before a failing job finished, the failure is fatal to
    /// the current run instead.
    pub fn post<T, F>(&self, timeout: Duration, func: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let watch = self.watch_job(timeout);
        let (handle, completer) = JobHandle::channel();
        self.reactor.post(Box::new(move || {
            let _watch = watch;
            let result = panic::catch_unwind(AssertUnwindSafe(func))
                .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)));
            completer.complete(result)
        }));
        handle
    }

    fn watch_job(&self, timeout: Duration) -> JobWatch {
        let watchdog = Arc::new(IntervalWatchdog::new(timeout));
        watchdog.tick();
        self.watchdogs.register_watchdog(watchdog.clone());
        JobWatch {
            watchdog,
            manager: Arc::clone(&self.watchdogs),
        }
    }

    /// Creates a stopped periodic task invoking `func` every `period`.
    ///
    /// With `use_watchdog`, the task carries a periodic watchdog (window
    /// `period * config.watchdog_window`) registered while the task runs.
    pub fn create_periodic_task<F>(
        &self,
        period: Duration,
        func: F,
        use_watchdog: bool,
    ) -> Arc<PeriodicTask>
    where
        F: FnMut() -> Result<(), TaskError> + Send + 'static,
    {
        PeriodicTask::create(
            Arc::clone(&self.reactor),
            period,
            Box::new(func),
            use_watchdog.then(|| Arc::clone(&self.watchdogs)),
            &self.config,
        )
    }

    /// Starts a periodic task reporting the aggregate watchdog health every `period`.
    ///
    /// `report` receives `true` when every registered watchdog passes. The
    /// reporting task watches itself. No-op if already started.
    pub fn start_watchdog_task<F>(&self, period: Duration, mut report: F)
    where
        F: FnMut(bool) + Send + 'static,
    {
        let mut slot = lock(&self.watchdog_task);
        if slot.is_some() {
            debug!("watchdog task already started");
            return;
        }
        let manager = Arc::clone(&self.watchdogs);
        let task = self.create_periodic_task(
            period,
            move || {
                report(manager.check());
                Ok(())
            },
            true,
        );
        task.start();
        *slot = Some(task);
        info!(period_ms = period.as_millis() as u64, "watchdog task started");
    }

    /// Stops the watchdog reporting task; no-op if it is not running.
    pub fn stop_watchdog_task(&self) {
        let task = lock(&self.watchdog_task).take();
        if let Some(task) = task {
            task.stop();
            info!("watchdog task stopped");
        }
    }

    /// Registers a one-shot handler for the next signal delivered during `run`.
    ///
    /// A pending handler counts as outstanding work: the loop will not run out
    /// of work while it waits. Signals that arrive with no handler waiting are
    /// kept until the end of the current run.
    pub fn add_signal_handler<F>(&self, handler: F)
    where
        F: FnOnce(i32) + Send + 'static,
    {
        self.reactor.add_signal_waiter(Box::new(handler));
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.stop_watchdog_task();
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("stopped", &self.stopped())
            .field("watchdogs", &self.watchdogs)
            .finish()
    }
}

impl ExecutorHandle {
    /// Same as [`Executor::stop`].
    pub fn stop(&self) {
        self.reactor.stop();
        info!("executor stop requested");
    }

    /// Same as [`Executor::stopped`].
    pub fn stopped(&self) -> bool {
        self.reactor.stopped()
    }
}

impl std::fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorHandle")
            .field("stopped", &self.stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn run_without_work_returns_immediately() {
        let executor = Executor::new();
        assert!(executor.run(2, &[]).is_ok());
        assert!(executor.stopped());
    }

    #[test]
    fn nested_run_is_rejected() {
        let executor = Arc::new(Executor::new());
        let inner = Arc::clone(&executor);
        let nested = executor.post(TIMEOUT, move || Ok(inner.run(0, &[])));

        executor.run(0, &[]).unwrap();
        assert!(matches!(nested.wait(), Ok(Err(RuntimeError::AlreadyRunning))));
    }

    #[test]
    fn job_watchdog_lives_until_the_job_finishes() {
        let executor = Executor::new();
        executor.spawn(TIMEOUT, || Ok(()));
        assert_eq!(executor.watchdogs().len(), 1);

        executor.run(0, &[]).unwrap();
        assert!(executor.watchdogs().is_empty());
    }

    #[test]
    fn posted_panic_reaches_the_handle() {
        let executor = Executor::new();
        let handle = executor.post(TIMEOUT, || -> Result<(), TaskError> { panic!("kaboom") });

        executor.run(0, &[]).unwrap();
        assert_eq!(
            handle.wait(),
            Err(TaskError::Panicked {
                info: "kaboom".into()
            })
        );
    }

    #[test]
    fn posted_error_without_handle_is_fatal() {
        let executor = Executor::new();
        let orphan = executor.post(TIMEOUT, || -> Result<u8, TaskError> {
            Err(TaskError::fail("orphan"))
        });
        drop(orphan);

        let err = executor.run(0, &[]).unwrap_err();
        assert_eq!(err.task_error(), Some(&TaskError::fail("orphan")));
    }

    #[test]
    fn spawned_panic_is_captured() {
        let executor = Executor::new();
        executor.spawn(TIMEOUT, || panic!("worker blew up"));

        let err = executor.run(1, &[]).unwrap_err();
        assert_eq!(
            err.task_error(),
            Some(&TaskError::Panicked {
                info: "worker blew up".into()
            })
        );
        assert!(executor.watchdogs().is_empty());
    }

    #[test]
    fn restart_allows_another_run() {
        let executor = Executor::new();
        let count = Arc::new(AtomicUsize::new(0));

        executor.stop();
        let seen = Arc::clone(&count);
        executor.spawn(TIMEOUT, move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        executor.run(0, &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        executor.restart();
        assert!(!executor.stopped());
        executor.run(0, &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn watchdog_task_start_and_stop_are_idempotent() {
        let executor = Executor::new();
        executor.start_watchdog_task(Duration::from_secs(60), |_| {});
        executor.start_watchdog_task(Duration::from_secs(60), |_| {});
        assert_eq!(executor.watchdogs().len(), 1);

        executor.stop_watchdog_task();
        executor.stop_watchdog_task();
        assert!(executor.watchdogs().is_empty());
    }
}
