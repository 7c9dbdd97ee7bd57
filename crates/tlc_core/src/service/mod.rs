//! Use-case orchestration over capture, reduction, calibration and report.
//!
//! # Responsibility
//! - Serialize the capture → reduce → fold → report cycle of each trial.
//! - Keep UI/FFI layers decoupled from file layout and record formats.

pub mod result_session;
