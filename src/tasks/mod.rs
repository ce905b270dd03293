//! # Work scheduled on an executor.
//!
//! - [`PeriodicTask`] - drift-corrected callback re-invoked every period
//! - [`JobHandle`] - eventual result of a posted job

mod handle;
mod periodic;

pub use handle::JobHandle;
pub use periodic::{PeriodicFn, PeriodicTask};
