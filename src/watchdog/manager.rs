//! # Registry of watchdogs with an aggregate health check.
//!
//! ```text
//! register_watchdog(w) ─┐
//! unregister_watchdog(w)┼──► Mutex<Vec<Arc<dyn Watchdog>>>
//! check() ──────────────┘        │
//!                                ▼
//!                all(w.check(now)) with one `now` snapshot
//! ```
//!
//! ## Rules
//! - A watchdog is stored at most once (identity = `Arc` pointer).
//! - Registration, unregistration and checks are serialized by one mutex.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};

use super::Watchdog;
use crate::sync::lock;

/// Thread-safe set of registered watchdogs.
#[derive(Default)]
pub struct WatchdogManager {
    watchdogs: Mutex<Vec<Arc<dyn Watchdog>>>,
}

/// Identity of an `Arc` regardless of the pointee's (possibly unsized) type.
fn same<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl WatchdogManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `watchdog` unless the same instance is already registered.
    pub fn register_watchdog(&self, watchdog: Arc<dyn Watchdog>) {
        let mut watchdogs = lock(&self.watchdogs);
        if !watchdogs.iter().any(|w| same(w, &watchdog)) {
            watchdogs.push(watchdog);
            debug!(registered = watchdogs.len(), "watchdog registered");
        }
    }

    /// Removes `watchdog` if it is registered; otherwise does nothing.
    pub fn unregister_watchdog<W: Watchdog + ?Sized>(&self, watchdog: &Arc<W>) {
        let mut watchdogs = lock(&self.watchdogs);
        let before = watchdogs.len();
        watchdogs.retain(|w| !same(w, watchdog));
        if watchdogs.len() != before {
            debug!(registered = watchdogs.len(), "watchdog unregistered");
        }
    }

    /// Checks every registered watchdog against the current instant.
    ///
    /// Returns `true` iff all of them pass (an empty manager is healthy).
    pub fn check(&self) -> bool {
        self.check_at(Instant::now())
    }

    /// Checks every registered watchdog against `now`.
    pub fn check_at(&self, now: Instant) -> bool {
        let watchdogs = lock(&self.watchdogs);
        let failed = watchdogs.iter().filter(|w| !w.check(now)).count();
        if failed > 0 {
            warn!(failed, total = watchdogs.len(), "watchdog check failed");
        }
        failed == 0
    }

    /// Number of registered watchdogs.
    pub fn len(&self) -> usize {
        lock(&self.watchdogs).len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        lock(&self.watchdogs).is_empty()
    }
}

impl std::fmt::Debug for WatchdogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchdogManager")
            .field("registered", &self.len())
            .finish()
    }
}
