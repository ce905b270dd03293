//! Monotonic timestamps encoded as signed nanoseconds.
//!
//! Watchdogs store their timestamps in atomics, so an [`Instant`] is mapped to
//! nanoseconds relative to a process-wide epoch (captured on first use).
//! Instants earlier than the epoch map to negative values.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Sentinel for "no timestamp recorded yet".
pub(crate) const NEVER: i64 = i64::MIN;

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

fn saturating_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

/// Encodes `at` as nanoseconds since the epoch.
pub(crate) fn to_nanos(at: Instant) -> i64 {
    let epoch = epoch();
    if at >= epoch {
        saturating_nanos(at - epoch)
    } else {
        // NEVER stays reserved.
        saturating_nanos(epoch - at).saturating_neg().max(NEVER + 1)
    }
}

/// Decodes a value produced by [`to_nanos`].
pub(crate) fn from_nanos(nanos: i64) -> Instant {
    let epoch = epoch();
    if nanos >= 0 {
        epoch + Duration::from_nanos(nanos.unsigned_abs())
    } else {
        epoch
            .checked_sub(Duration::from_nanos(nanos.unsigned_abs()))
            .unwrap_or(epoch)
    }
}

/// Current time in epoch nanoseconds.
pub(crate) fn now_nanos() -> i64 {
    to_nanos(Instant::now())
}

/// Window length in nanoseconds, widened so differences never overflow.
pub(crate) fn window_nanos(window: Duration) -> i128 {
    i128::try_from(window.as_nanos()).unwrap_or(i128::MAX)
}
