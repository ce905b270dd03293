//! Runtime core: event loop, signals and the executor facade.
//!
//! The public API from this module is [`Executor`] (with its [`ExecutorHandle`])
//! and [`ExecutorConfig`].
//!
//! Internal modules:
//! - [`reactor`]: the event loop with timers, outstanding-work accounting and signal waits;
//! - [`signals`]: OS signal listener feeding the reactor while `run` is active;
//! - [`executor`]: multi-threaded `run`, job submission and the watchdog reporting task.

mod config;
mod executor;
pub(crate) mod reactor;
mod signals;

pub use config::ExecutorConfig;
pub use executor::{Executor, ExecutorHandle};
