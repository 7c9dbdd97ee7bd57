//! Repeated-trial averaging and standard-curve calibration.
//!
//! # Responsibility
//! - Fold per-trial spot measurements into full-precision running sums.
//! - Fit `D_avg = slope * concentration + intercept` through Standard columns.
//! - Back-solve concentrations for Unknown columns.
//!
//! # Invariants
//! - Running sums are never rounded; rounding happens only in
//!   [`rounding::round_half_up`] at display/report time.
//! - A rejected trial leaves sums and trial count untouched.
//! - A fit is recomputed on every request; nothing is cached across role or
//!   concentration edits.

pub mod engine;
pub mod fit;
pub mod rounding;
