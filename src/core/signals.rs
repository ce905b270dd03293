//! # OS signal listener feeding the reactor.
//!
//! While `Executor::run` is active, each requested signal is hooked with a
//! handler that writes the signal number into a socket pair. A dedicated thread
//! drives a current-thread tokio runtime that reads the socket and forwards each
//! delivery to [`Reactor::deliver_signal`].
//!
//! ```text
//! run(threads, [SIGINT, SIGTERM])
//!   └─► SignalListener::start
//!          ├─► "tickvisor-signals" thread
//!          │      select { token.cancelled(), socket.read() }
//!          │                  │                   │
//!          │                exit       reactor.deliver_signal(n)
//!          └─► sigaction(n, on_signal) ── saves the previous disposition
//! ```
//!
//! ## Rules
//! - Hooks are installed before any pump starts, so a signal raised by the
//!   very first job is not lost.
//! - Dropping the listener puts every previous disposition back, then cancels
//!   and joins its thread. After `run` returns the process reacts to those
//!   signals exactly as it did before.
//! - Listeners hooking the same signal must be dropped in reverse order.
//!
//! **Windows platforms:** only `SIGINT` (2) is supported, via `Ctrl-C`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::reactor::Reactor;
use crate::error::RuntimeError;

/// Listens for OS signals on behalf of one `run` call.
pub(crate) struct SignalListener {
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
    hooks: Hooks,
    // Closed only after the thread is joined.
    wake: Wake,
}

impl SignalListener {
    /// Hooks `signals` and starts the listener thread.
    ///
    /// Returns `Ok(None)` when there is nothing to listen for.
    pub(crate) fn start(
        reactor: Arc<Reactor>,
        signals: &[i32],
    ) -> Result<Option<Self>, RuntimeError> {
        let mut signals = signals.to_vec();
        signals.sort_unstable();
        signals.dedup();
        let Some(&first) = signals.first() else {
            return Ok(None);
        };

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| RuntimeError::Signal {
                signal: first,
                source,
            })?;
        let (wake, source) = open(&runtime, first)?;

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let thread = thread::Builder::new()
            .name("tickvisor-signals".to_string())
            .spawn(move || listen(runtime, source, reactor, cancelled))
            .map_err(|source| RuntimeError::WorkerSpawn { source })?;

        let mut listener = Self {
            token,
            thread: Some(thread),
            hooks: Hooks::default(),
            wake,
        };
        listener.hooks.install(&signals, &listener.wake)?;

        debug!(?signals, "signal listener started");
        Ok(Some(listener))
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.hooks.restore();
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        debug!("signal listener stopped");
    }
}

#[cfg(unix)]
mod unix {
    use std::io;
    use std::os::fd::{AsRawFd, RawFd};
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicI32, Ordering};

    use nix::errno::Errno;
    use nix::libc;
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
    use tokio::runtime::Runtime;

    use crate::error::RuntimeError;

    const MAX_SIGNAL: usize = 65;

    /// Write end of the wake-up socket currently hooked to each signal number.
    static WAKE_FDS: [AtomicI32; MAX_SIGNAL] = [const { AtomicI32::new(-1) }; MAX_SIGNAL];

    pub(super) type Wake = UnixStream;
    pub(super) type Source = tokio::net::UnixStream;

    pub(super) fn open(runtime: &Runtime, first: i32) -> Result<(Wake, Source), RuntimeError> {
        let failed = |source: io::Error| RuntimeError::Signal {
            signal: first,
            source,
        };
        let (wake, read) = UnixStream::pair().map_err(failed)?;
        wake.set_nonblocking(true).map_err(failed)?;
        read.set_nonblocking(true).map_err(failed)?;
        let _entered = runtime.enter();
        let source = tokio::net::UnixStream::from_std(read).map_err(failed)?;
        Ok((wake, source))
    }

    extern "C" fn on_signal(signal: libc::c_int) {
        let Some(slot) = usize::try_from(signal).ok().and_then(|n| WAKE_FDS.get(n)) else {
            return;
        };
        let fd = slot.load(Ordering::Acquire);
        if fd < 0 {
            return;
        }
        let errno = Errno::last_raw();
        let byte = signal as u8;
        // Async-signal-safe calls only. A full socket drops the wake-up.
        unsafe { libc::write(fd, std::ptr::from_ref(&byte).cast(), 1) };
        Errno::set_raw(errno);
    }

    struct Hook {
        signal: Signal,
        previous: SigAction,
        previous_fd: RawFd,
    }

    /// Installed handlers and the dispositions they replaced.
    #[derive(Default)]
    pub(super) struct Hooks(Vec<Hook>);

    impl Hooks {
        pub(super) fn install(&mut self, signals: &[i32], wake: &Wake) -> Result<(), RuntimeError> {
            for &n in signals {
                self.0.push(hook(n, wake.as_raw_fd())?);
            }
            Ok(())
        }

        /// Puts back the previous dispositions, newest first.
        pub(super) fn restore(&mut self) {
            while let Some(hook) = self.0.pop() {
                // SAFETY: reinstalls the action that was in place before `hook`.
                let _ = unsafe { sigaction(hook.signal, &hook.previous) };
                if let Some(slot) = WAKE_FDS.get(hook.signal as usize) {
                    slot.store(hook.previous_fd, Ordering::Release);
                }
            }
        }
    }

    impl Drop for Hooks {
        fn drop(&mut self) {
            self.restore();
        }
    }

    fn hook(n: i32, wake: RawFd) -> Result<Hook, RuntimeError> {
        let failed = |errno: Errno| RuntimeError::Signal {
            signal: n,
            source: io::Error::from(errno),
        };
        let signal = Signal::try_from(n).map_err(failed)?;
        let slot = WAKE_FDS.get(signal as usize).ok_or(failed(Errno::EINVAL))?;

        let previous_fd = slot.swap(wake, Ordering::AcqRel);
        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: `on_signal` only touches atomics, errno and write(2).
        match unsafe { sigaction(signal, &action) } {
            Ok(previous) => Ok(Hook {
                signal,
                previous,
                previous_fd,
            }),
            Err(errno) => {
                slot.store(previous_fd, Ordering::Release);
                Err(failed(errno))
            }
        }
    }
}

#[cfg(unix)]
use unix::{Hooks, Source, Wake, open};

#[cfg(unix)]
fn listen(runtime: Runtime, mut source: Source, reactor: Arc<Reactor>, token: CancellationToken) {
    use tokio::io::AsyncReadExt;
    use tracing::warn;

    runtime.block_on(async move {
        let mut buf = [0u8; 64];
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                read = source.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(len) => {
                        for &n in &buf[..len] {
                            debug!(signal = n, "signal received");
                            reactor.deliver_signal(i32::from(n));
                        }
                    }
                    Err(error) => {
                        warn!(%error, "signal listener failed");
                        break;
                    }
                },
            }
        }
        // Handlers may still write until the listener is dropped.
        token.cancelled().await;
    });
}

#[cfg(not(unix))]
const SIGINT: i32 = 2;

#[cfg(not(unix))]
type Wake = ();

#[cfg(not(unix))]
type Source = ();

#[cfg(not(unix))]
fn open(_runtime: &Runtime, _first: i32) -> Result<(Wake, Source), RuntimeError> {
    Ok(((), ()))
}

#[cfg(not(unix))]
#[derive(Default)]
struct Hooks;

#[cfg(not(unix))]
impl Hooks {
    fn install(&mut self, signals: &[i32], _wake: &Wake) -> Result<(), RuntimeError> {
        match signals.iter().find(|&&n| n != SIGINT) {
            Some(&n) => Err(RuntimeError::Signal {
                signal: n,
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "only SIGINT is supported",
                ),
            }),
            None => Ok(()),
        }
    }

    fn restore(&mut self) {}
}

#[cfg(not(unix))]
fn listen(runtime: Runtime, _source: Source, reactor: Arc<Reactor>, token: CancellationToken) {
    runtime.block_on(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                received = tokio::signal::ctrl_c() => match received {
                    Ok(()) => {
                        debug!(signal = SIGINT, "signal received");
                        reactor.deliver_signal(SIGINT);
                    }
                    Err(_) => break,
                },
            }
        }
    });
}
