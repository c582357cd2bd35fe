//! Status reconciliation against external observations.

pub mod diff;

pub use diff::{apply_diff, compute_diff, EvseStatusDiff};
