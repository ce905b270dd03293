//! # Result handle for posted jobs.
//!
//! [`Executor::post`](crate::Executor::post) returns a [`JobHandle`] that
//! completes with the job's return value, its error, or its panic.
//!
//! ## Rules
//! - The result is delivered exactly once.
//! - If the job is discarded without running, the handle yields [`TaskError::Canceled`].
//! - If the handle is dropped before the job finishes, a failing job's error is
//!   fatal to the run (nobody else could observe it); a successful value is discarded.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::TaskError;

/// Handle to the eventual result of a posted job.
///
/// Await it from async code, or block on [`JobHandle::wait`] from a thread that
/// is not pumping the executor.
#[must_use = "dropping the handle makes a failing job fatal to the run"]
#[derive(Debug)]
pub struct JobHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

/// Sending half owned by the queued job.
pub(crate) struct Completer<T> {
    tx: oneshot::Sender<Result<T, TaskError>>,
}

impl<T> JobHandle<T> {
    pub(crate) fn channel() -> (Self, Completer<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { rx }, Completer { tx })
    }

    /// Blocks the current thread until the job has finished.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context; await
    /// the handle there instead. Calling it from a job on the same executor can
    /// deadlock when no other pump is free to run the awaited job.
    pub fn wait(self) -> Result<T, TaskError> {
        self.rx.blocking_recv().unwrap_or(Err(TaskError::Canceled))
    }

    /// Takes the result if the job has finished, without blocking.
    ///
    /// Returns `None` while the job is still pending. After the result was taken
    /// once, further calls report [`TaskError::Canceled`].
    pub fn try_take(&mut self) -> Option<Result<T, TaskError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TaskError::Canceled)),
        }
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Canceled)))
    }
}

impl<T> Completer<T> {
    /// Delivers `result`; hands the error back when nobody is listening.
    pub(crate) fn complete(self, result: Result<T, TaskError>) -> Result<(), TaskError> {
        match self.tx.send(result) {
            Ok(()) | Err(Ok(_)) => Ok(()),
            Err(Err(error)) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_value_once() {
        let (mut handle, completer) = JobHandle::channel();
        assert!(handle.try_take().is_none());
        assert!(completer.complete(Ok(42)).is_ok());
        assert_eq!(handle.try_take(), Some(Ok(42)));
        assert_eq!(handle.try_take(), Some(Err(TaskError::Canceled)));
    }

    #[test]
    fn dropped_completer_cancels() {
        let (handle, completer) = JobHandle::<()>::channel();
        drop(completer);
        assert_eq!(handle.wait(), Err(TaskError::Canceled));
    }

    #[test]
    fn error_without_listener_is_returned() {
        let (handle, completer) = JobHandle::<u8>::channel();
        drop(handle);
        assert_eq!(
            completer.complete(Err(TaskError::fail("lost"))),
            Err(TaskError::fail("lost"))
        );

        let (handle, completer) = JobHandle::<u8>::channel();
        drop(handle);
        assert!(completer.complete(Ok(1)).is_ok());
    }

    #[tokio::test]
    async fn handle_is_awaitable() {
        let (handle, completer) = JobHandle::channel();
        std::thread::spawn(move || completer.complete(Ok("done")));
        assert_eq!(handle.await, Ok("done"));
    }
}
