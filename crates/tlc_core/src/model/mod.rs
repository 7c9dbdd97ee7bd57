//! Plate-assay domain model.
//!
//! # Responsibility
//! - Define the measurement, role and trial records shared by capture,
//!   calibration and reporting.
//!
//! # Invariants
//! - A trial's measurement vector has exactly one entry per spot column.
//! - Trial indices are 1-based and strictly increasing within a result session.

pub mod measurement;
pub mod trial;
