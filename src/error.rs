//! Error types used by the executor runtime and user work.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`] - errors surfaced by [`Executor::run`](crate::Executor::run).
//! - [`TaskError`] - errors raised by user callbacks (spawned, posted or periodic work).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::any::Any;
use std::fmt::Display;
use std::io;

use thiserror::Error;

/// # Errors produced by the executor runtime.
///
/// A failing [`Executor::run`](crate::Executor::run) returns exactly one of these,
/// after every worker thread has been joined.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// `run` was called while another `run` was still pumping the loop.
    #[error("executor is already running")]
    AlreadyRunning,

    /// Registering an OS signal with the listener failed.
    #[error("failed to register signal {signal}: {source}")]
    Signal {
        /// Raw signal number that was requested.
        signal: i32,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {source}")]
    WorkerSpawn {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The first failure captured from any pump thread during this run.
    #[error("task failed: {source}")]
    TaskFailed {
        /// The captured task error.
        #[source]
        source: TaskError,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tickvisor::RuntimeError;
    ///
    /// assert_eq!(RuntimeError::AlreadyRunning.as_label(), "runtime_already_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AlreadyRunning => "runtime_already_running",
            RuntimeError::Signal { .. } => "runtime_signal",
            RuntimeError::WorkerSpawn { .. } => "runtime_worker_spawn",
            RuntimeError::TaskFailed { .. } => "runtime_task_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::AlreadyRunning => "already running".to_string(),
            RuntimeError::Signal { signal, source } => format!("signal {signal}: {source}"),
            RuntimeError::WorkerSpawn { source } => format!("worker spawn: {source}"),
            RuntimeError::TaskFailed { source } => source.as_message(),
        }
    }

    /// Returns the captured task failure, if this error carries one.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            RuntimeError::TaskFailed { source } => Some(source),
            _ => None,
        }
    }
}

impl From<TaskError> for RuntimeError {
    fn from(source: TaskError) -> Self {
        RuntimeError::TaskFailed { source }
    }
}

/// # Errors produced by user work.
///
/// Any of these escaping a spawned job or a periodic task is fatal to the current
/// run. Posted jobs hand their error to the returned [`JobHandle`](crate::JobHandle).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The callback reported a failure.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The callback panicked; the payload message is preserved.
    #[error("panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The job was discarded before it could produce a result.
    #[error("job cancelled before completion")]
    Canceled,
}

impl TaskError {
    /// Builds a [`TaskError::Fail`] from anything printable.
    ///
    /// # Example
    /// ```
    /// use tickvisor::TaskError;
    ///
    /// let err = TaskError::fail("disk full");
    /// assert_eq!(err.to_string(), "execution failed: disk full");
    /// ```
    pub fn fail(error: impl Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Converts a panic payload (as returned by `catch_unwind`) into an error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let info = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        TaskError::Panicked { info }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tickvisor::TaskError;
    ///
    /// assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Panicked { info } => format!("panic: {info}"),
            TaskError::Canceled => "job cancelled".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, UnwindSafe};

    fn payload_of(f: impl FnOnce() + UnwindSafe) -> Box<dyn Any + Send> {
        panic::catch_unwind(f).unwrap_err()
    }

    #[test]
    fn panic_payload_str_is_preserved() {
        let payload = payload_of(|| panic!("boom"));
        assert_eq!(
            TaskError::from_panic(payload),
            TaskError::Panicked {
                info: "boom".into()
            }
        );
    }

    #[test]
    fn panic_payload_string_is_preserved() {
        let code = 7;
        let payload = payload_of(move || panic!("code {code}"));
        assert_eq!(TaskError::from_panic(payload).as_message(), "panic: code 7");
    }

    #[test]
    fn runtime_error_exposes_task_failure() {
        let err = RuntimeError::from(TaskError::fail("nope"));
        assert_eq!(err.as_label(), "runtime_task_failed");
        assert_eq!(err.task_error(), Some(&TaskError::fail("nope")));
        assert!(RuntimeError::AlreadyRunning.task_error().is_none());
    }
}
