//! Result session: one experiment's trials, calibration and report.
//!
//! # Responsibility
//! - Hand out trial slots (`<root_dir>/<index>`) one at a time.
//! - Fold validated reducer output into the engine and the report.
//! - Write the final summary exactly once.
//!
//! # Invariants
//! - At most one trial is pending; trials are folded in index order.
//! - A failed or abandoned trial folds nothing and writes no record, not
//!   even its location.
//! - Once finished, the session accepts no further mutation.

use crate::calibration::engine::{CalibrationEngine, CalibrationError, Prediction};
use crate::capture::{
    CaptureError, CaptureSession, CaptureSettings, FinalizedCapture, LocationProvider, PhotoStore,
};
use crate::config::{ConfigError, SessionConfig};
use crate::model::measurement::{measurements_from_flat, Role, SpotMeasurement};
use crate::model::trial::Trial;
use crate::reduce::{validate_output, ImageReducer, ReductionError, ReductionTask};
use crate::report::{FinalSummary, ReportError, ReportWriter};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Directory reserved for the next trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialSlot {
    pub index: u32,
    pub directory: PathBuf,
}

/// Folded trial plus the averages to show after it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub trial: Trial,
    /// Running averages rounded to the configured display places.
    pub display_averages: Vec<SpotMeasurement>,
}

#[derive(Debug)]
pub enum ResultSessionError {
    Config(ConfigError),
    Io { path: PathBuf, source: std::io::Error },
    Calibration(CalibrationError),
    Capture(CaptureError),
    Reduction(ReductionError),
    Report(ReportError),
    /// A trial slot is already open.
    TrialInProgress(u32),
    /// No trial slot is open.
    NoPendingTrial,
    /// Slot does not match the open trial.
    StaleSlot { expected: u32, actual: u32 },
    AlreadyFinished,
}

impl Display for ResultSessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Io { path, source } => {
                write!(f, "io failure at `{}`: {source}", path.display())
            }
            Self::Calibration(err) => write!(f, "{err}"),
            Self::Capture(err) => write!(f, "{err}"),
            Self::Reduction(err) => write!(f, "unable to process: {err}"),
            Self::Report(err) => write!(f, "{err}"),
            Self::TrialInProgress(index) => write!(f, "trial {index} is still in progress"),
            Self::NoPendingTrial => write!(f, "no trial in progress"),
            Self::StaleSlot { expected, actual } => {
                write!(f, "trial slot {actual} is stale; trial {expected} is in progress")
            }
            Self::AlreadyFinished => write!(f, "result session already finished"),
        }
    }
}

impl Error for ResultSessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Calibration(err) => Some(err),
            Self::Capture(err) => Some(err),
            Self::Reduction(err) => Some(err),
            Self::Report(err) => Some(err),
            Self::TrialInProgress(_)
            | Self::NoPendingTrial
            | Self::StaleSlot { .. }
            | Self::AlreadyFinished => None,
        }
    }
}

impl From<ConfigError> for ResultSessionError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<CalibrationError> for ResultSessionError {
    fn from(value: CalibrationError) -> Self {
        Self::Calibration(value)
    }
}

impl From<CaptureError> for ResultSessionError {
    fn from(value: CaptureError) -> Self {
        Self::Capture(value)
    }
}

impl From<ReductionError> for ResultSessionError {
    fn from(value: ReductionError) -> Self {
        Self::Reduction(value)
    }
}

impl From<ReportError> for ResultSessionError {
    fn from(value: ReportError) -> Self {
        Self::Report(value)
    }
}

pub type ResultSessionResult<T> = Result<T, ResultSessionError>;

#[derive(Debug)]
struct PendingTrial {
    slot: TrialSlot,
    capture: Option<FinalizedCapture>,
}

/// Calibration session spanning every trial of one experiment.
pub struct ResultSession {
    id: Uuid,
    config: SessionConfig,
    engine: CalibrationEngine,
    report: ReportWriter,
    pending: Option<PendingTrial>,
    finished: bool,
}

impl ResultSession {
    /// Validates `config` and ensures the experiment directory exists.
    pub fn open(config: SessionConfig) -> ResultSessionResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.root_dir).map_err(|source| ResultSessionError::Io {
            path: config.root_dir.clone(),
            source,
        })?;

        let session = Self {
            id: Uuid::new_v4(),
            engine: CalibrationEngine::from_config(&config),
            report: ReportWriter::for_experiment(&config.root_dir, &config.format),
            config,
            pending: None,
            finished: false,
        };
        info!(
            "event=session_open module=session status=ok session_id={} columns={}",
            session.id,
            session.engine.num_columns()
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    pub fn report(&self) -> &ReportWriter {
        &self.report
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pending_trial(&self) -> Option<&TrialSlot> {
        self.pending.as_ref().map(|pending| &pending.slot)
    }

    pub fn set_role(&mut self, column: usize, role: Role) -> ResultSessionResult<()> {
        self.ensure_open()?;
        Ok(self.engine.set_role(column, role)?)
    }

    pub fn set_standard_concentration(
        &mut self,
        column: usize,
        value: Option<f64>,
    ) -> ResultSessionResult<()> {
        self.ensure_open()?;
        Ok(self.engine.set_standard_concentration(column, value)?)
    }

    /// Reserves `<root_dir>/<next index>` for the next trial.
    pub fn begin_trial(&mut self) -> ResultSessionResult<TrialSlot> {
        self.ensure_open()?;
        if let Some(pending) = &self.pending {
            return Err(ResultSessionError::TrialInProgress(pending.slot.index));
        }
        let index = self.engine.next_trial_index();
        let slot = TrialSlot {
            index,
            directory: self.config.root_dir.join(index.to_string()),
        };
        self.pending = Some(PendingTrial {
            slot: slot.clone(),
            capture: None,
        });
        info!(
            "event=trial_begin module=session status=ok session_id={} index={}",
            self.id, index
        );
        Ok(slot)
    }

    /// Starts photo acquisition into `slot`'s directory.
    pub fn start_capture<S: PhotoStore, L: LocationProvider>(
        &self,
        slot: &TrialSlot,
        store: S,
        location: L,
    ) -> ResultSessionResult<CaptureSession<S, L>> {
        self.pending_for(slot)?;
        Ok(CaptureSession::start(
            slot.directory.clone(),
            CaptureSettings::from_config(&self.config),
            store,
            location,
        )?)
    }

    /// Attaches a finished capture to the open trial.
    ///
    /// Its location record is written together with the trial record by
    /// [`Self::complete_trial`].
    pub fn record_capture(
        &mut self,
        slot: &TrialSlot,
        finalized: &FinalizedCapture,
    ) -> ResultSessionResult<()> {
        self.ensure_open()?;
        self.pending_for(slot)?;
        if let Some(pending) = self.pending.as_mut() {
            pending.capture = Some(finalized.clone());
        }
        Ok(())
    }

    /// Spawns `reducer` over `slot`'s photos.
    pub fn start_reduction<R: ImageReducer>(
        &self,
        slot: &TrialSlot,
        reducer: Arc<R>,
    ) -> ResultSessionResult<ReductionTask> {
        self.pending_for(slot)?;
        Ok(ReductionTask::spawn(reducer, slot.directory.clone())?)
    }

    /// Validates reducer output, appends the location and trial records,
    /// then folds the trial.
    ///
    /// The slot is released whatever the outcome; after a failure the next
    /// `begin_trial` reuses the same index.
    pub fn complete_trial(
        &mut self,
        slot: &TrialSlot,
        reduction: Result<Vec<f64>, ReductionError>,
    ) -> ResultSessionResult<TrialOutcome> {
        self.ensure_open()?;
        self.pending_for(slot)?;
        let pending = self.pending.take().ok_or(ResultSessionError::NoPendingTrial)?;

        let num_columns = self.engine.num_columns();
        let measurements = reduction
            .and_then(|values| {
                validate_output(&values, num_columns)?;
                measurements_from_flat(&values, num_columns).ok_or_else(|| {
                    ReductionError::ProcessingFailed("malformed measurement vector".to_string())
                })
            })
            .map_err(|err| {
                warn!(
                    "event=trial_complete module=session status=error session_id={} index={} reason=processing_failed",
                    self.id, slot.index
                );
                ResultSessionError::Reduction(err)
            })?;

        let location = pending.capture.as_ref().and_then(|capture| capture.location);
        let trial = Trial {
            index: pending.slot.index,
            directory: pending.slot.directory.clone(),
            measurements,
            location,
        };
        if pending.capture.is_some() {
            self.report.append_captured_trial(&trial, location.as_ref())?;
        } else {
            self.report.append_trial(&trial)?;
        }

        let recorded =
            self.engine
                .record_trial(trial.directory, trial.measurements, trial.location)?;
        let display_averages = self.engine.display_averages()?;
        info!(
            "event=trial_complete module=session status=ok session_id={} index={}",
            self.id, recorded.trial.index
        );
        Ok(TrialOutcome {
            trial: recorded.trial,
            display_averages,
        })
    }

    /// Drops the open trial and removes its partial directory.
    pub fn abandon_trial(&mut self, slot: &TrialSlot) -> ResultSessionResult<()> {
        self.pending_for(slot)?;
        self.pending = None;
        self.discard_dir(slot);
        Ok(())
    }

    /// Fits the standard curve and back-solves every Unknown column.
    ///
    /// # Errors
    /// - `NoUnknowns`, `InsufficientStandards`, `MissingConcentration`,
    ///   `DegenerateFit`, `NoTrials`, `FlatResponse`, checked in that order.
    pub fn calculate(&self) -> ResultSessionResult<Prediction> {
        if self.engine.columns_with_role(Role::Unknown).is_empty() {
            return Err(CalibrationError::NoUnknowns.into());
        }
        let fit = self.engine.fit()?;
        let prediction = self.engine.predict(&fit)?;
        info!(
            "event=calculate module=session status=ok session_id={} unknowns={}",
            self.id,
            prediction.estimates.len()
        );
        Ok(prediction)
    }

    /// Stores display-rounded estimates as the Unknown columns' values.
    pub fn confirm_predictions(&mut self, prediction: &Prediction) -> ResultSessionResult<()> {
        self.ensure_open()?;
        Ok(self.engine.confirm_predictions(prediction)?)
    }

    /// Appends the final-summary record; valid once.
    ///
    /// An open trial never reaches the report; it is abandoned only after
    /// the summary is written, so a failed finish leaves it in place.
    pub fn finish(&mut self) -> ResultSessionResult<FinalSummary> {
        self.ensure_open()?;
        let summary = FinalSummary::from_engine(&self.engine)?;
        self.report.append_final_summary(&summary)?;
        self.finished = true;

        if let Some(pending) = self.pending.take() {
            warn!(
                "event=session_finish module=session status=ok session_id={} abandoned_index={}",
                self.id, pending.slot.index
            );
            self.discard_dir(&pending.slot);
        }
        info!(
            "event=session_finish module=session status=ok session_id={} trials={}",
            self.id,
            self.engine.trial_count()
        );
        Ok(summary)
    }

    fn ensure_open(&self) -> ResultSessionResult<()> {
        if self.finished {
            return Err(ResultSessionError::AlreadyFinished);
        }
        Ok(())
    }

    fn pending_for(&self, slot: &TrialSlot) -> ResultSessionResult<()> {
        match &self.pending {
            None => Err(ResultSessionError::NoPendingTrial),
            Some(pending) if pending.slot != *slot => Err(ResultSessionError::StaleSlot {
                expected: pending.slot.index,
                actual: slot.index,
            }),
            Some(_) => Ok(()),
        }
    }

    fn discard_dir(&self, slot: &TrialSlot) {
        match std::fs::remove_dir_all(&slot.directory) {
            Ok(()) => info!(
                "event=trial_abandon module=session status=ok session_id={} index={}",
                self.id, slot.index
            ),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                "event=trial_abandon module=session status=error session_id={} index={} kind={:?}",
                self.id,
                slot.index,
                err.kind()
            ),
        }
    }
}
