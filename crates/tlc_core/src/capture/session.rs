//! Capture session state machine with an ordered command inbox.
//!
//! # Responsibility
//! - Translate host commands (focus results, button presses, camera
//!   callbacks) into state transitions and signals for the host.
//! - Persist each delivered photo through a [`PhotoStore`].
//!
//! # Invariants
//! - Phases run Sample then Background; each takes exactly
//!   `max_pictures` persisted shots.
//! - The sample series needs a prior successful focus; the background
//!   series does not.
//! - Terminal states (`Finalized`, `Abandoned`, `Failed`) accept no command.

use crate::capture::{
    CaptureCommand, CaptureError, CapturePhase, CaptureSignal, FinalizedCapture, LocationProvider,
    PhotoStore,
};
use crate::config::SessionConfig;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Shot counts and retry limits of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub max_pictures: u32,
    /// Consecutive failures of one shot tolerated before aborting.
    pub max_shot_retries: u32,
}

impl CaptureSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_pictures: config.max_pictures,
            max_shot_retries: config.max_shot_retries,
        }
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Waiting for a successful focus probe before the sample series.
    AwaitingFocus,
    /// `shot` is the 0-based index of the next photo to persist. While
    /// `in_flight` is false the series waits for the capture button.
    Capturing {
        phase: CapturePhase,
        shot: u32,
        in_flight: bool,
    },
    Finalized,
    Abandoned,
    /// Aborted after a fatal storage failure.
    Failed,
}

impl CaptureState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitingFocus => "awaiting_focus",
            Self::Capturing {
                in_flight: false, ..
            } => "armed",
            Self::Capturing { .. } => "capturing",
            Self::Finalized => "finalized",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Abandoned | Self::Failed)
    }
}

/// One trial's photo acquisition.
pub struct CaptureSession<S: PhotoStore, L: LocationProvider> {
    trial_dir: PathBuf,
    settings: CaptureSettings,
    state: CaptureState,
    failures_for_shot: u32,
    inbox: VecDeque<CaptureCommand>,
    store: S,
    location: L,
    outcome: Option<FinalizedCapture>,
}

impl<S: PhotoStore, L: LocationProvider> CaptureSession<S, L> {
    /// Prepares `trial_dir` and enters `AwaitingFocus`.
    ///
    /// # Errors
    /// - [`CaptureError::Io`] when the phase directories cannot be created.
    pub fn start(
        trial_dir: PathBuf,
        settings: CaptureSettings,
        mut store: S,
        location: L,
    ) -> Result<Self, CaptureError> {
        store.prepare(&trial_dir).map_err(|err| {
            error!(
                "event=capture_start module=capture status=error reason=prepare_failed"
            );
            CaptureError::Io {
                path: trial_dir.clone(),
                reason: err.to_string(),
            }
        })?;
        info!(
            "event=capture_start module=capture status=ok max_pictures={} max_shot_retries={}",
            settings.max_pictures, settings.max_shot_retries
        );
        Ok(Self {
            trial_dir,
            settings,
            state: CaptureState::AwaitingFocus,
            failures_for_shot: 0,
            inbox: VecDeque::new(),
            store,
            location,
            outcome: None,
        })
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn trial_dir(&self) -> &Path {
        &self.trial_dir
    }

    /// Present once both phases completed.
    pub fn outcome(&self) -> Option<&FinalizedCapture> {
        self.outcome.as_ref()
    }

    /// Number of queued, unprocessed commands.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Queues a command; nothing happens until [`Self::drain`].
    pub fn submit(&mut self, command: CaptureCommand) {
        self.inbox.push_back(command);
    }

    /// Processes every queued command in order.
    ///
    /// Refused commands surface as [`CaptureSignal::Rejected`]; processing
    /// continues with the next command.
    pub fn drain(&mut self) -> Vec<CaptureSignal> {
        let mut signals = Vec::new();
        while let Some(command) = self.inbox.pop_front() {
            match self.handle(command) {
                Ok(mut emitted) => signals.append(&mut emitted),
                Err(err) => {
                    if err == CaptureError::FocusRequired {
                        signals.push(CaptureSignal::PleaseFocus);
                    }
                    signals.push(CaptureSignal::Rejected(err));
                }
            }
        }
        signals
    }

    /// Applies one command immediately.
    pub fn handle(&mut self, command: CaptureCommand) -> Result<Vec<CaptureSignal>, CaptureError> {
        if self.state.is_terminal() {
            return Err(self.invalid(&command));
        }
        debug!(
            "event=capture_command module=capture status=ok state={} command={}",
            self.state.label(),
            command.label()
        );

        match (self.state, command) {
            (_, CaptureCommand::Abandon) => {
                self.state = CaptureState::Abandoned;
                info!("event=capture_abandoned module=capture status=ok");
                Ok(vec![CaptureSignal::Abandoned])
            }
            (CaptureState::AwaitingFocus, CaptureCommand::FocusResult(true)) => {
                self.state = CaptureState::Capturing {
                    phase: CapturePhase::Sample,
                    shot: 0,
                    in_flight: false,
                };
                Ok(vec![CaptureSignal::FocusReady])
            }
            (CaptureState::AwaitingFocus, CaptureCommand::FocusResult(false)) => {
                Ok(vec![CaptureSignal::PleaseFocus])
            }
            (CaptureState::AwaitingFocus, CaptureCommand::CaptureRequested) => {
                Err(CaptureError::FocusRequired)
            }
            (
                CaptureState::Capturing {
                    phase: CapturePhase::Sample,
                    shot: 0,
                    in_flight: false,
                },
                CaptureCommand::FocusResult(false),
            ) => {
                self.state = CaptureState::AwaitingFocus;
                Ok(vec![CaptureSignal::PleaseFocus])
            }
            (CaptureState::Capturing { .. }, CaptureCommand::FocusResult(_)) => Ok(Vec::new()),
            (
                CaptureState::Capturing {
                    phase,
                    shot,
                    in_flight: false,
                },
                CaptureCommand::CaptureRequested,
            ) => {
                self.state = CaptureState::Capturing {
                    phase,
                    shot,
                    in_flight: true,
                };
                info!(
                    "event=capture_series module=capture status=started phase={}",
                    phase.as_str()
                );
                Ok(vec![CaptureSignal::TakePicture { phase, shot }])
            }
            (CaptureState::Capturing { .. }, CaptureCommand::CaptureRequested) => {
                Err(CaptureError::ShotInFlight)
            }
            (
                CaptureState::Capturing {
                    phase,
                    shot,
                    in_flight: true,
                },
                CaptureCommand::PhotoTaken(bytes),
            ) => {
                match self.store.persist(&self.trial_dir, phase, shot + 1, &bytes) {
                    Ok(path) => Ok(self.on_shot_saved(phase, shot, path)),
                    Err(err) => self.on_shot_failed(phase, shot, err.to_string()),
                }
            }
            (
                CaptureState::Capturing {
                    phase,
                    shot,
                    in_flight: true,
                },
                CaptureCommand::PhotoFailed(reason),
            ) => self.on_shot_failed(phase, shot, reason),
            (_, command) => Err(self.invalid(&command)),
        }
    }

    fn on_shot_saved(&mut self, phase: CapturePhase, shot: u32, path: PathBuf) -> Vec<CaptureSignal> {
        self.failures_for_shot = 0;
        let mut signals = vec![CaptureSignal::PhotoSaved { phase, shot, path }];
        let next = shot + 1;
        if next < self.settings.max_pictures {
            self.state = CaptureState::Capturing {
                phase,
                shot: next,
                in_flight: true,
            };
            signals.push(CaptureSignal::TakePicture { phase, shot: next });
            return signals;
        }

        info!(
            "event=capture_phase module=capture status=completed phase={} shots={}",
            phase.as_str(),
            next
        );
        signals.push(CaptureSignal::PhaseCompleted(phase));
        match phase {
            CapturePhase::Sample => {
                self.state = CaptureState::Capturing {
                    phase: CapturePhase::Background,
                    shot: 0,
                    in_flight: false,
                };
                signals.push(CaptureSignal::CaptureArmed(CapturePhase::Background));
            }
            CapturePhase::Background => signals.push(self.finalize()),
        }
        signals
    }

    fn on_shot_failed(
        &mut self,
        phase: CapturePhase,
        shot: u32,
        reason: String,
    ) -> Result<Vec<CaptureSignal>, CaptureError> {
        self.failures_for_shot += 1;
        warn!(
            "event=capture_shot module=capture status=error phase={} shot={} attempt={} reason_len={}",
            phase.as_str(),
            shot + 1,
            self.failures_for_shot,
            reason.len()
        );
        if self.failures_for_shot > self.settings.max_shot_retries {
            self.state = CaptureState::Failed;
            error!(
                "event=capture_aborted module=capture status=error phase={} shot={}",
                phase.as_str(),
                shot + 1
            );
            return Err(CaptureError::RetriesExhausted { phase, shot });
        }
        Ok(vec![CaptureSignal::TakePicture { phase, shot }])
    }

    fn finalize(&mut self) -> CaptureSignal {
        let outcome = FinalizedCapture {
            trial_dir: self.trial_dir.clone(),
            location: self.location.current_fix(),
        };
        self.state = CaptureState::Finalized;
        info!(
            "event=capture_finalized module=capture status=ok location_known={}",
            outcome.location.is_some()
        );
        self.outcome = Some(outcome.clone());
        CaptureSignal::Finalized(outcome)
    }

    fn invalid(&self, command: &CaptureCommand) -> CaptureError {
        CaptureError::InvalidCommand {
            state: self.state.label(),
            command: command.label(),
        }
    }
}
