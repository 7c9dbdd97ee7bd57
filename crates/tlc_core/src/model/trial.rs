//! Trial record and location annotation.

use crate::model::measurement::SpotMeasurement;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Best-effort geolocation attached when a capture session finalizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationStamp {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix epoch milliseconds of the fix.
    pub fixed_at_epoch_ms: i64,
}

/// One acquisition + reduction cycle.
///
/// Immutable once built; a result session only ever appends trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// 1-based, strictly increasing.
    pub index: u32,
    pub directory: PathBuf,
    /// One entry per spot column, in column order.
    pub measurements: Vec<SpotMeasurement>,
    /// `None` when no fix was available at finalization.
    pub location: Option<LocationStamp>,
}
