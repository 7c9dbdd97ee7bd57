//! Core domain logic for the TLC plate assay.
//! This crate is the single source of truth for capture, calibration and
//! report invariants.

pub mod calibration;
pub mod capture;
pub mod config;
pub mod experiment;
pub mod logging;
pub mod model;
pub mod reduce;
pub mod report;
pub mod service;

pub use calibration::engine::{
    CalibrationEngine, CalibrationError, Prediction, RecordedTrial, SpotColumn,
};
pub use calibration::fit::CalibrationFit;
pub use calibration::rounding::{format_decimal, round_half_up};
pub use capture::{
    CaptureCommand, CaptureError, CapturePhase, CaptureSession, CaptureSettings, CaptureSignal,
    CaptureState, FinalizedCapture, FsPhotoStore, LatestFix, LocationProvider, PhotoStore,
};
pub use config::{ColumnSetup, ConfigError, ReportFormat, SessionConfig};
pub use experiment::{prepare_experiment_dir, start_experiment, ExperimentError, ExperimentInfo};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::measurement::{measurements_from_flat, Role, SpotMeasurement};
pub use model::trial::{LocationStamp, Trial};
pub use reduce::{CancelToken, ImageReducer, ReductionError, ReductionTask};
pub use report::{FinalSummary, ReportError, ReportWriter};
pub use service::result_session::{
    ResultSession, ResultSessionError, ResultSessionResult, TrialOutcome, TrialSlot,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
