//! # tickvisor
//!
//! **Tickvisor** is a small real-time executor for Rust.
//!
//! It pumps one event loop on a pool of OS threads and runs blocking callbacks
//! on it: one-shot jobs, jobs with a result handle, drift-corrected periodic
//! tasks and OS signal handlers. Watchdogs track whether periodic tasks keep
//! firing and whether jobs finish in time.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   spawn(timeout, f)   post(timeout, f)   PeriodicTask   add_signal_handler(h)
//!          │                  │                 │                  │
//!          │  IntervalWatchdog│    PeriodicWatchdog                │
//!          │    (tick/tock)   │     (tick on fire)                 │
//!          ▼                  ▼                 ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Reactor (ready queue + timer heap + signal waiters)              │
//! │  outstanding work counter: 0 ─► loop stops by itself              │
//! └──────┬──────────────────┬──────────────────┬───────────────▲──────┘
//!        ▼                  ▼                  ▼               │
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐   ┌─────┴──────────┐
//!   │ worker-0 │  ...  │ worker-N │       │  caller  │   │ SignalListener │
//!   │   pump   │       │   pump   │       │   pump   │   │ (tokio, OS)    │
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘   └────────────────┘
//!        └──── Err / panic ─┴──► first failure wins, loop stops ─► run() = Err
//!
//!   WatchdogManager ◄── register/unregister ── jobs, periodic tasks
//!        └──► check() every report period ──► user health callback(bool)
//! ```
//!
//! ### Periodic task lifecycle
//! ```text
//! create_periodic_task(period, f, use_watchdog)   (stopped)
//!   └─► start_after(delay)
//!         loop {
//!           ├─► timer fires; lateness > drift threshold ─► warn!
//!           ├─► watchdog.tick(); f()?                    (Err/panic ─► fatal)
//!           ├─► stopped? ─► exit
//!           └─► re-arm after clamp(period - elapsed, 0, period)
//!         }
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types                                  |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Execution**     | Multi-threaded run loop with stop/restart and signals.       | [`Executor`], [`ExecutorHandle`]           |
//! | **Jobs**          | One-shot work, optionally with an awaitable result.          | [`JobHandle`]                              |
//! | **Periodic work** | Drift-corrected periodic callbacks with `run_now`.           | [`PeriodicTask`]                           |
//! | **Liveness**      | Watchdogs and an aggregate health check.                     | [`Watchdog`], [`WatchdogManager`]          |
//! | **Errors**        | Typed errors for the runtime and for user callbacks.         | [`RuntimeError`], [`TaskError`]            |
//! | **Configuration** | Drift tolerance, watchdog window, thread names.              | [`ExecutorConfig`]                         |
//!
//! ## Logging
//! The crate emits [`tracing`] events (lifecycle at `info`, drift and watchdog
//! failures at `warn`, captured task failures at `error`). Install any
//! subscriber to see them.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//! use tickvisor::Executor;
//!
//! fn main() -> Result<(), tickvisor::RuntimeError> {
//!     let executor = Executor::new();
//!     let handle = executor.handle();
//!     let ticks = Arc::new(AtomicUsize::new(0));
//!
//!     let seen = Arc::clone(&ticks);
//!     let task = executor.create_periodic_task(
//!         Duration::from_millis(5),
//!         move || {
//!             if seen.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
//!                 handle.stop();
//!             }
//!             Ok(())
//!         },
//!         true,
//!     );
//!     task.start();
//!
//!     // One worker thread plus the calling thread.
//!     executor.run(1, &[])?;
//!     task.stop();
//!     assert_eq!(ticks.load(Ordering::SeqCst), 3);
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod sync;
mod tasks;
mod watchdog;

// ---- Public re-exports ----

pub use crate::core::{Executor, ExecutorConfig, ExecutorHandle};
pub use error::{RuntimeError, TaskError};
pub use tasks::{JobHandle, PeriodicFn, PeriodicTask};
pub use watchdog::{IntervalWatchdog, PeriodicWatchdog, Watchdog, WatchdogManager};
