//! Image reduction boundary: photo folders in, flat `(Rf, D)` vector out.
//!
//! # Responsibility
//! - Define the pluggable [`ImageReducer`] contract.
//! - Run one reduction on a worker thread with cooperative cancellation.
//! - Validate the trial directory layout before handing it to a reducer.
//!
//! # Invariants
//! - A cancelled or failed reduction never yields measurements.
//! - Reducers never see a trial directory without sample photos.
//!
//! # See also
//! - `service::result_session` for how results are folded into a session.

use crate::config::{BG_FOLDER, SAMPLE_FOLDER};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

static PHOTO_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9][0-9]*\.jpg$").expect("valid photo name regex"));

/// Turns a trial directory into `[Rf_1, D_1, ..., Rf_n, D_n]`.
///
/// Implementations should poll `cancel` between expensive steps and return
/// `None` on failure or cancellation.
pub trait ImageReducer: Send + Sync + 'static {
    fn reduce(&self, trial_dir: &Path, cancel: &CancelToken) -> Option<Vec<f64>>;
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReductionError {
    /// Reducer reported failure, or its output was unusable.
    ProcessingFailed(String),
    /// Cancelled before a result was accepted.
    Cancelled,
    /// Worker thread panicked.
    WorkerPanicked,
    /// Worker thread could not be spawned.
    Spawn(String),
}

impl Display for ReductionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessingFailed(reason) => write!(f, "processing failed: {reason}"),
            Self::Cancelled => write!(f, "processing cancelled"),
            Self::WorkerPanicked => write!(f, "processing worker panicked"),
            Self::Spawn(reason) => write!(f, "failed to start processing worker: {reason}"),
        }
    }
}

impl Error for ReductionError {}

/// Photo counts found in a trial directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhotoInventory {
    pub sample: usize,
    pub background: usize,
}

/// Counts `<n>.jpg` photos in the sample and background folders.
///
/// # Errors
/// - [`ReductionError::ProcessingFailed`] when a folder is unreadable or the
///   sample folder holds no photo.
pub fn inspect_trial_dir(trial_dir: &Path) -> Result<PhotoInventory, ReductionError> {
    let inventory = PhotoInventory {
        sample: count_photos(&trial_dir.join(SAMPLE_FOLDER))?,
        background: count_photos(&trial_dir.join(BG_FOLDER))?,
    };
    if inventory.sample == 0 {
        return Err(ReductionError::ProcessingFailed(
            "no sample photos".to_string(),
        ));
    }
    Ok(inventory)
}

fn count_photos(dir: &Path) -> Result<usize, ReductionError> {
    let entries = std::fs::read_dir(dir).map_err(|err| {
        ReductionError::ProcessingFailed(format!("cannot read `{}`: {err}", dir.display()))
    })?;
    let mut count = 0;
    for entry in entries.flatten() {
        let is_file = entry.file_type().map(|kind| kind.is_file()).unwrap_or(false);
        if is_file && PHOTO_NAME_RE.is_match(&entry.file_name().to_string_lossy()) {
            count += 1;
        }
    }
    Ok(count)
}

/// Checks a reducer's flat output against the session's column count.
pub fn validate_output(values: &[f64], num_columns: usize) -> Result<(), ReductionError> {
    if values.len() != num_columns * 2 {
        return Err(ReductionError::ProcessingFailed(format!(
            "expected {} values, got {}",
            num_columns * 2,
            values.len()
        )));
    }
    if values.iter().any(|value| !value.is_finite()) {
        return Err(ReductionError::ProcessingFailed(
            "non-finite measurement".to_string(),
        ));
    }
    Ok(())
}

/// One reduction running on its own worker thread.
pub struct ReductionTask {
    trial_dir: PathBuf,
    cancel: CancelToken,
    handle: JoinHandle<Option<Vec<f64>>>,
}

impl ReductionTask {
    /// Inspects `trial_dir`, then starts `reducer` on a worker thread.
    pub fn spawn<R: ImageReducer>(reducer: Arc<R>, trial_dir: PathBuf) -> Result<Self, ReductionError> {
        let inventory = inspect_trial_dir(&trial_dir)?;
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let worker_dir = trial_dir.clone();
        let handle = thread::Builder::new()
            .name("tlc-reduce".to_string())
            .spawn(move || reducer.reduce(&worker_dir, &worker_cancel))
            .map_err(|err| ReductionError::Spawn(err.to_string()))?;
        info!(
            "event=reduction_start module=reduce status=ok sample_photos={} bg_photos={}",
            inventory.sample, inventory.background
        );
        Ok(Self {
            trial_dir,
            cancel,
            handle,
        })
    }

    pub fn trial_dir(&self) -> &Path {
        &self.trial_dir
    }

    /// Requests cancellation; the result of [`Self::join`] is discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Handle that cancels this task from another thread while `join` waits.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker and returns its flat vector.
    pub fn join(self) -> Result<Vec<f64>, ReductionError> {
        let outcome = self.handle.join();
        if self.cancel.is_cancelled() {
            info!("event=reduction_done module=reduce status=cancelled");
            return Err(ReductionError::Cancelled);
        }
        match outcome {
            Err(_) => {
                error!("event=reduction_done module=reduce status=error reason=panic");
                Err(ReductionError::WorkerPanicked)
            }
            Ok(None) => {
                warn!("event=reduction_done module=reduce status=error reason=reducer_failed");
                Err(ReductionError::ProcessingFailed(
                    "reducer returned no result".to_string(),
                ))
            }
            Ok(Some(values)) => {
                info!(
                    "event=reduction_done module=reduce status=ok values={}",
                    values.len()
                );
                Ok(values)
            }
        }
    }
}
