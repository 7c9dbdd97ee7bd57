//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the result-session and capture flow to Dart via FRB.
//! - Hold the single active result session and capture session.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every session mutation runs under one process-wide lock.
//! - Failures are reported through `ok = false` envelopes, never thrown.

use log::warn;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tlc_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    CaptureCommand, CaptureSession, CaptureSignal, FsPhotoStore, LatestFix, LocationStamp,
    ReductionError, ResultSession, Role, SessionConfig,
};

static APP_STATE: OnceLock<Mutex<AppState>> = OnceLock::new();
static LOCATION: OnceLock<LatestFix> = OnceLock::new();

#[derive(Default)]
struct AppState {
    session: Option<ResultSession>,
    capture: Option<CaptureSession<FsPhotoStore, LatestFix>>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Generic action envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Human-readable message for diagnostics/UI.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Trial slot handed out by `session_begin_trial`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialResponse {
    pub ok: bool,
    pub message: String,
    pub trial_index: Option<u32>,
    /// Absolute trial directory (`<root>/<index>`).
    pub trial_dir: Option<String>,
}

/// One rendering instruction produced by the capture state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSignalItem {
    /// `focus_ready|please_focus|take_picture|photo_saved|phase_completed|capture_armed|finalized|abandoned|rejected`.
    pub kind: String,
    /// `sample|background` when the signal concerns a phase.
    pub phase: Option<String>,
    /// 0-based shot index for picture signals.
    pub shot: Option<u32>,
    /// Saved photo path or finalized trial directory.
    pub path: Option<String>,
    /// Rejection reason.
    pub detail: Option<String>,
}

/// Capture command envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResponse {
    pub ok: bool,
    pub message: String,
    /// State label after processing (`awaiting_focus|armed|capturing|...`).
    pub state: String,
    pub signals: Vec<CaptureSignalItem>,
}

/// Display-rounded running averages after a trial.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragesResponse {
    pub ok: bool,
    pub message: String,
    pub trial_index: Option<u32>,
    pub rf: Vec<f64>,
    pub d: Vec<f64>,
}

/// One back-solved concentration.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateItem {
    pub column: u32,
    pub concentration: f64,
}

/// Calibration envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculateResponse {
    pub ok: bool,
    pub message: String,
    pub slope: Option<f64>,
    pub intercept: Option<f64>,
    pub estimates: Vec<EstimateItem>,
}

/// Opens a new result session from a JSON `SessionConfig`.
///
/// Replaces any previous session; an unfinished capture is dropped.
#[flutter_rust_bridge::frb(sync)]
pub fn session_open(config_json: String) -> ActionResponse {
    let opened = SessionConfig::from_json(config_json.as_str())
        .map_err(|err| err.to_string())
        .and_then(|config| ResultSession::open(config).map_err(|err| err.to_string()));
    let session = match opened {
        Ok(session) => session,
        Err(err) => return ActionResponse::failure(format!("session_open failed: {err}")),
    };
    with_state(|state| {
        state.capture = None;
        state.session = Some(session);
        ActionResponse::success("Session opened.")
    })
    .unwrap_or_else(ActionResponse::failure)
}

/// Sets a column role from `std|standard|unknown`.
#[flutter_rust_bridge::frb(sync)]
pub fn session_set_role(column: u32, role: String) -> ActionResponse {
    let Some(role) = parse_role(role.as_str()) else {
        return ActionResponse::failure(format!("unknown role `{}`", role.trim()));
    };
    with_session(|session| session.set_role(column as usize, role).map_err(|err| err.to_string()))
        .map(|()| ActionResponse::success("Role updated."))
        .unwrap_or_else(ActionResponse::failure)
}

/// Stores (or clears with `None`) a column's concentration.
#[flutter_rust_bridge::frb(sync)]
pub fn session_set_concentration(column: u32, value: Option<f64>) -> ActionResponse {
    with_session(|session| {
        session
            .set_standard_concentration(column as usize, value)
            .map_err(|err| err.to_string())
    })
    .map(|()| ActionResponse::success("Concentration updated."))
    .unwrap_or_else(ActionResponse::failure)
}

/// Reserves the next trial and starts its capture session.
#[flutter_rust_bridge::frb(sync)]
pub fn session_begin_trial() -> TrialResponse {
    let result = with_state(|state| {
        let session = state.session.as_mut().ok_or_else(no_session)?;
        let slot = session.begin_trial().map_err(|err| err.to_string())?;
        match session.start_capture(&slot, FsPhotoStore, location_cache().clone()) {
            Ok(capture) => {
                state.capture = Some(capture);
                Ok(slot)
            }
            Err(err) => {
                if session.abandon_trial(&slot).is_err() {
                    warn!(
                        "event=trial_begin module=ffi status=error index={} reason=abandon_failed",
                        slot.index
                    );
                }
                Err(err.to_string())
            }
        }
    })
    .and_then(|inner| inner);

    match result {
        Ok(slot) => TrialResponse {
            ok: true,
            message: "Trial started.".to_string(),
            trial_index: Some(slot.index),
            trial_dir: Some(slot.directory.to_string_lossy().into_owned()),
        },
        Err(err) => TrialResponse {
            ok: false,
            message: format!("session_begin_trial failed: {err}"),
            trial_index: None,
            trial_dir: None,
        },
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn capture_focus_result(success: bool) -> CaptureResponse {
    run_capture(CaptureCommand::FocusResult(success))
}

#[flutter_rust_bridge::frb(sync)]
pub fn capture_request() -> CaptureResponse {
    run_capture(CaptureCommand::CaptureRequested)
}

/// Delivers the encoded photo of the outstanding shot.
#[flutter_rust_bridge::frb(sync)]
pub fn capture_photo_taken(bytes: Vec<u8>) -> CaptureResponse {
    run_capture(CaptureCommand::PhotoTaken(bytes))
}

#[flutter_rust_bridge::frb(sync)]
pub fn capture_photo_failed(reason: String) -> CaptureResponse {
    run_capture(CaptureCommand::PhotoFailed(reason))
}

#[flutter_rust_bridge::frb(sync)]
pub fn capture_abandon() -> CaptureResponse {
    run_capture(CaptureCommand::Abandon)
}

/// Caches the latest fix reported by the host location service.
#[flutter_rust_bridge::frb(sync)]
pub fn capture_update_location(latitude: f64, longitude: f64, fixed_at_epoch_ms: i64) -> ActionResponse {
    if !latitude.is_finite() || !longitude.is_finite() {
        return ActionResponse::failure("location must be finite");
    }
    location_cache().update(LocationStamp {
        latitude,
        longitude,
        fixed_at_epoch_ms,
    });
    ActionResponse::success("Location updated.")
}

/// Folds the reducer's flat `Rf0, D0, Rf1, D1, ...` output into the session.
///
/// An empty vector means the reducer failed.
#[flutter_rust_bridge::frb(sync)]
pub fn session_complete_trial(values: Vec<f64>) -> AveragesResponse {
    let result = with_state(|state| {
        if state.capture.is_some() {
            return Err("capture still in progress".to_string());
        }
        let session = state.session.as_mut().ok_or_else(no_session)?;
        let slot = session
            .pending_trial()
            .cloned()
            .ok_or_else(|| "no trial in progress".to_string())?;
        let reduction = if values.is_empty() {
            Err(ReductionError::ProcessingFailed(
                "reducer returned no result".to_string(),
            ))
        } else {
            Ok(values)
        };
        session
            .complete_trial(&slot, reduction)
            .map_err(|err| err.to_string())
    })
    .and_then(|inner| inner);

    match result {
        Ok(outcome) => AveragesResponse {
            ok: true,
            message: format!("Trial {} recorded.", outcome.trial.index),
            trial_index: Some(outcome.trial.index),
            rf: outcome.display_averages.iter().map(|avg| avg.rf).collect(),
            d: outcome.display_averages.iter().map(|avg| avg.d).collect(),
        },
        Err(err) => AveragesResponse {
            ok: false,
            message: format!("session_complete_trial failed: {err}"),
            trial_index: None,
            rf: Vec::new(),
            d: Vec::new(),
        },
    }
}

/// Fits the standards and back-solves the unknowns.
///
/// With `confirm`, the display-rounded estimates become the Unknown
/// columns' recorded concentrations.
#[flutter_rust_bridge::frb(sync)]
pub fn session_calculate(confirm: bool) -> CalculateResponse {
    let result = with_session(|session| {
        let prediction = session.calculate().map_err(|err| err.to_string())?;
        if confirm {
            session
                .confirm_predictions(&prediction)
                .map_err(|err| err.to_string())?;
        }
        Ok(prediction)
    });

    match result {
        Ok(prediction) => CalculateResponse {
            ok: true,
            message: "Calculated.".to_string(),
            slope: Some(prediction.fit.slope),
            intercept: Some(prediction.fit.intercept),
            estimates: prediction
                .estimates
                .iter()
                .map(|(&column, &concentration)| EstimateItem {
                    column: column as u32,
                    concentration,
                })
                .collect(),
        },
        Err(err) => CalculateResponse {
            ok: false,
            message: format!("session_calculate failed: {err}"),
            slope: None,
            intercept: None,
            estimates: Vec::new(),
        },
    }
}

/// Appends the final summary; the session stays readable but frozen.
#[flutter_rust_bridge::frb(sync)]
pub fn session_finish() -> ActionResponse {
    with_state(|state| {
        let session = state.session.as_mut().ok_or_else(no_session)?;
        session.finish().map_err(|err| err.to_string())?;
        state.capture = None;
        Ok(())
    })
    .and_then(|inner| inner)
    .map(|_| ActionResponse::success("Final result written."))
    .unwrap_or_else(|err| ActionResponse::failure(format!("session_finish failed: {err}")))
}

fn run_capture(command: CaptureCommand) -> CaptureResponse {
    let result = with_state(|state| {
        let capture = state
            .capture
            .as_mut()
            .ok_or_else(|| "no capture in progress".to_string())?;
        capture.submit(command);
        let signals = capture.drain();
        let label = capture.state().label().to_string();
        let finalized = capture.outcome().cloned();
        let terminal = capture.state().is_terminal();

        if terminal {
            state.capture = None;
            if let Some(session) = state.session.as_mut() {
                if let Some(slot) = session.pending_trial().cloned() {
                    let settled = match &finalized {
                        Some(outcome) => session.record_capture(&slot, outcome),
                        None => session.abandon_trial(&slot),
                    };
                    if let Err(err) = settled {
                        return Err(err.to_string());
                    }
                }
            }
        }
        Ok((label, signals))
    })
    .and_then(|inner| inner);

    match result {
        Ok((state, signals)) => {
            let rejected = signals
                .iter()
                .filter(|signal| matches!(signal, CaptureSignal::Rejected(_)))
                .count();
            CaptureResponse {
                ok: rejected == 0,
                message: if rejected == 0 {
                    "OK".to_string()
                } else {
                    "Command rejected.".to_string()
                },
                state,
                signals: signals.into_iter().map(to_signal_item).collect(),
            }
        }
        Err(err) => CaptureResponse {
            ok: false,
            message: format!("capture failed: {err}"),
            state: String::new(),
            signals: Vec::new(),
        },
    }
}

fn to_signal_item(signal: CaptureSignal) -> CaptureSignalItem {
    let item = |kind: &str| CaptureSignalItem {
        kind: kind.to_string(),
        phase: None,
        shot: None,
        path: None,
        detail: None,
    };
    match signal {
        CaptureSignal::FocusReady => item("focus_ready"),
        CaptureSignal::PleaseFocus => item("please_focus"),
        CaptureSignal::TakePicture { phase, shot } => CaptureSignalItem {
            phase: Some(phase.as_str().to_string()),
            shot: Some(shot),
            ..item("take_picture")
        },
        CaptureSignal::PhotoSaved { phase, shot, path } => CaptureSignalItem {
            phase: Some(phase.as_str().to_string()),
            shot: Some(shot),
            path: Some(path.to_string_lossy().into_owned()),
            ..item("photo_saved")
        },
        CaptureSignal::PhaseCompleted(phase) => CaptureSignalItem {
            phase: Some(phase.as_str().to_string()),
            ..item("phase_completed")
        },
        CaptureSignal::CaptureArmed(phase) => CaptureSignalItem {
            phase: Some(phase.as_str().to_string()),
            ..item("capture_armed")
        },
        CaptureSignal::Finalized(outcome) => CaptureSignalItem {
            path: Some(outcome.trial_dir.to_string_lossy().into_owned()),
            ..item("finalized")
        },
        CaptureSignal::Abandoned => item("abandoned"),
        CaptureSignal::Rejected(err) => CaptureSignalItem {
            detail: Some(err.to_string()),
            ..item("rejected")
        },
    }
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "standard" => Some(Role::Standard),
        other => Role::from_tag(other),
    }
}

fn location_cache() -> &'static LatestFix {
    LOCATION.get_or_init(LatestFix::new)
}

fn no_session() -> String {
    "no session open".to_string()
}

fn lock_state() -> Result<MutexGuard<'static, AppState>, String> {
    APP_STATE
        .get_or_init(|| Mutex::new(AppState::default()))
        .lock()
        .map_err(|_| {
            warn!("event=ffi_state module=session status=error reason=poisoned");
            "session state unavailable".to_string()
        })
}

fn with_state<T>(f: impl FnOnce(&mut AppState) -> T) -> Result<T, String> {
    let mut guard = lock_state()?;
    Ok(f(&mut guard))
}

fn with_session<T>(
    f: impl FnOnce(&mut ResultSession) -> Result<T, String>,
) -> Result<T, String> {
    with_state(|state| match state.session.as_mut() {
        Some(session) => f(session),
        None => Err(no_session()),
    })
    .and_then(|inner| inner)
}

#[cfg(test)]
mod tests {
    use super::{
        capture_focus_result, capture_photo_taken, capture_request, core_version, init_logging,
        parse_role, ping, session_begin_trial, session_calculate, session_complete_trial,
        session_finish, session_open, session_set_concentration, session_set_role,
    };
    use tlc_core::Role;

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn parse_role_accepts_report_tags_and_names() {
        assert_eq!(parse_role("std"), Some(Role::Standard));
        assert_eq!(parse_role(" Standard "), Some(Role::Standard));
        assert_eq!(parse_role("unknown"), Some(Role::Unknown));
        assert_eq!(parse_role("blank"), None);
    }

    // Single test drives the shared process-wide session end to end.
    #[test]
    fn session_flow_from_open_to_finish() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("exp");
        let config = format!(
            r#"{{ "root_dir": {}, "num_columns": 3, "max_pictures": 1 }}"#,
            json_string(root.to_str().expect("utf-8 temp path"))
        );
        let opened = session_open(config);
        assert!(opened.ok, "{}", opened.message);

        for (column, value) in [(0, 10.0), (1, 20.0)] {
            assert!(session_set_role(column, "std".to_string()).ok);
            assert!(session_set_concentration(column, Some(value)).ok);
        }
        assert!(!session_set_role(0, "blank".to_string()).ok);

        let trial = session_begin_trial();
        assert!(trial.ok, "{}", trial.message);
        assert_eq!(trial.trial_index, Some(1));

        let refused = capture_request();
        assert!(!refused.ok);
        assert_eq!(refused.state, "awaiting_focus");
        assert!(refused.signals.iter().any(|s| s.kind == "please_focus"));

        assert!(capture_focus_result(true).ok);
        let early_finish = session_finish();
        assert!(!early_finish.ok);
        assert!(capture_request().ok, "capture survives a failed finish");
        let sample = capture_photo_taken(vec![1, 2, 3]);
        assert!(sample.signals.iter().any(|s| s.kind == "capture_armed"));
        assert!(capture_request().ok);
        let done = capture_photo_taken(vec![4, 5, 6]);
        assert_eq!(done.state, "finalized");
        assert!(done.signals.iter().any(|s| s.kind == "finalized"));

        let failed = session_complete_trial(Vec::new());
        assert!(!failed.ok);

        let retry = session_begin_trial();
        assert!(retry.ok, "{}", retry.message);
        assert_eq!(retry.trial_index, Some(1));
        assert!(capture_focus_result(true).ok);
        assert!(capture_request().ok);
        assert!(capture_photo_taken(vec![7]).ok);
        assert!(capture_request().ok);
        assert_eq!(capture_photo_taken(vec![8]).state, "finalized");

        let averages = session_complete_trial(vec![0.2, 5.0, 0.4, 10.0, 0.3, 7.5]);
        assert!(averages.ok, "{}", averages.message);
        assert_eq!(averages.d, vec![5.0, 10.0, 7.5]);

        let calculated = session_calculate(true);
        assert!(calculated.ok, "{}", calculated.message);
        assert_eq!(calculated.estimates.len(), 1);
        assert_eq!(calculated.estimates[0].column, 2);
        assert!((calculated.estimates[0].concentration - 15.0).abs() < 1e-9);

        assert!(session_finish().ok);
        assert!(!session_finish().ok);

        let report = std::fs::read_to_string(root.join("log.txt")).expect("report written");
        assert!(report.starts_with("Location: unknown\r\nTrial 1:\r\n"));
        assert_eq!(report.matches("Location:").count(), 1);
        assert!(report.contains("\t10\t\t20\t\t15.0\t\r\n"));
    }

    fn json_string(value: &str) -> String {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
