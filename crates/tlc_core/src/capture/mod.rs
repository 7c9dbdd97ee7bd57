//! Two-phase plate photo acquisition.
//!
//! # Responsibility
//! - Sequence a fixed number of shots of the sample plate, then of the
//!   background plate, for one trial.
//! - Gate the sample series on a successful focus probe.
//! - Hand back the trial directory and a best-effort location once done.
//!
//! # Invariants
//! - At most one shot is outstanding at any time.
//! - A failed shot is retried with the same index; shots are never skipped.
//! - Commands are processed strictly in submission order.

pub mod location;
pub mod session;
pub mod store;

use crate::model::trial::LocationStamp;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub use location::{LatestFix, LocationProvider};
pub use session::{CaptureSession, CaptureSettings, CaptureState};
pub use store::{photo_file_name, FsPhotoStore, PhotoStore};

/// Plate currently being photographed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapturePhase {
    Sample,
    Background,
}

impl CapturePhase {
    /// Sub-folder of the trial directory holding this phase's photos.
    pub fn folder(self) -> &'static str {
        match self {
            Self::Sample => crate::config::SAMPLE_FOLDER,
            Self::Background => crate::config::BG_FOLDER,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Background => "background",
        }
    }
}

/// Input fed to a capture session by the host (UI or camera driver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureCommand {
    /// Outcome of a touch-to-focus probe.
    FocusResult(bool),
    /// User pressed the capture button.
    CaptureRequested,
    /// Camera delivered the encoded photo for the outstanding shot.
    PhotoTaken(Vec<u8>),
    /// Camera failed to deliver the outstanding shot.
    PhotoFailed(String),
    /// User backed out of the capture screen.
    Abandon,
}

impl CaptureCommand {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FocusResult(_) => "focus_result",
            Self::CaptureRequested => "capture_requested",
            Self::PhotoTaken(_) => "photo_taken",
            Self::PhotoFailed(_) => "photo_failed",
            Self::Abandon => "abandon",
        }
    }
}

/// Session output after both phases complete.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedCapture {
    pub trial_dir: PathBuf,
    /// `None` is reported as an unknown location.
    pub location: Option<LocationStamp>,
}

/// Instructions for the rendering/camera layer.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureSignal {
    /// Focus succeeded; the capture button may be used.
    FocusReady,
    /// Ask the user to touch-to-focus.
    PleaseFocus,
    /// Trigger the camera for `shot` (0-based) of `phase`.
    TakePicture { phase: CapturePhase, shot: u32 },
    /// A photo was persisted.
    PhotoSaved {
        phase: CapturePhase,
        shot: u32,
        path: PathBuf,
    },
    PhaseCompleted(CapturePhase),
    /// Capture button re-enabled for a new series.
    CaptureArmed(CapturePhase),
    Finalized(FinalizedCapture),
    Abandoned,
    /// A queued command was refused; the session keeps its state unless the
    /// error is fatal.
    Rejected(CaptureError),
}

/// Capture-session failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Capture attempted on the sample plate before focus succeeded.
    FocusRequired,
    /// A shot is already outstanding.
    ShotInFlight,
    /// Command is not valid in the current state.
    InvalidCommand {
        state: &'static str,
        command: &'static str,
    },
    /// Storage setup failed; the session never started.
    Io { path: PathBuf, reason: String },
    /// Persisting one shot kept failing; the session is aborted.
    RetriesExhausted { phase: CapturePhase, shot: u32 },
}

impl CaptureError {
    /// Fatal errors end the session; others only reject one command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::RetriesExhausted { .. })
    }
}

impl Display for CaptureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FocusRequired => write!(f, "please touch to focus"),
            Self::ShotInFlight => write!(f, "a picture is already being taken"),
            Self::InvalidCommand { state, command } => {
                write!(f, "command `{command}` is not valid in state `{state}`")
            }
            Self::Io { path, reason } => {
                write!(f, "capture storage failure at `{}`: {reason}", path.display())
            }
            Self::RetriesExhausted { phase, shot } => write!(
                f,
                "giving up on {} shot {} after repeated failures",
                phase.as_str(),
                shot + 1
            ),
        }
    }
}

impl Error for CaptureError {}
