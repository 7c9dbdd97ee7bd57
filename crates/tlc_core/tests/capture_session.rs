use std::path::Path;
use tlc_core::{
    CaptureCommand, CaptureError, CapturePhase, CaptureSession, CaptureSettings, CaptureSignal,
    CaptureState, FsPhotoStore, LatestFix, LocationStamp,
};

const EIGHT: CaptureSettings = CaptureSettings {
    max_pictures: 8,
    max_shot_retries: 3,
};

fn start(dir: &Path, location: LatestFix) -> CaptureSession<FsPhotoStore, LatestFix> {
    CaptureSession::start(dir.join("1"), EIGHT, FsPhotoStore, location).unwrap()
}

fn photo_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn take(session: &mut CaptureSession<FsPhotoStore, LatestFix>) -> Vec<CaptureSignal> {
    session.handle(CaptureCommand::PhotoTaken(b"jpeg".to_vec())).unwrap()
}

#[test]
fn start_creates_both_phase_directories() {
    let dir = tempfile::tempdir().unwrap();
    let session = start(dir.path(), LatestFix::new());
    assert!(session.trial_dir().join("sample").is_dir());
    assert!(session.trial_dir().join("bg").is_dir());
    assert_eq!(session.state(), CaptureState::AwaitingFocus);
}

#[test]
fn unwritable_trial_dir_fails_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("1");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let err = CaptureSession::start(blocker, EIGHT, FsPhotoStore, LatestFix::new())
        .err()
        .unwrap();
    assert!(matches!(err, CaptureError::Io { .. }));
    assert!(err.is_fatal());
}

#[test]
fn eight_shots_per_phase_drive_exact_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = start(dir.path(), LatestFix::new());
    let sample_dir = session.trial_dir().join("sample");
    let bg_dir = session.trial_dir().join("bg");

    session.handle(CaptureCommand::FocusResult(true)).unwrap();
    assert_eq!(
        session.handle(CaptureCommand::CaptureRequested).unwrap(),
        vec![CaptureSignal::TakePicture {
            phase: CapturePhase::Sample,
            shot: 0
        }]
    );

    for shot in 0..7 {
        let signals = take(&mut session);
        assert_eq!(
            signals.last(),
            Some(&CaptureSignal::TakePicture {
                phase: CapturePhase::Sample,
                shot: shot + 1
            })
        );
    }
    assert_eq!(
        session.state(),
        CaptureState::Capturing {
            phase: CapturePhase::Sample,
            shot: 7,
            in_flight: true
        }
    );

    let eighth = take(&mut session);
    assert!(eighth.contains(&CaptureSignal::PhaseCompleted(CapturePhase::Sample)));
    assert!(eighth.contains(&CaptureSignal::CaptureArmed(CapturePhase::Background)));
    assert_eq!(
        session.state(),
        CaptureState::Capturing {
            phase: CapturePhase::Background,
            shot: 0,
            in_flight: false
        }
    );
    assert_eq!(photo_count(&sample_dir), 8);
    assert!(sample_dir.join("8.jpg").is_file());
    assert!(!sample_dir.join("9.jpg").exists());

    // Background is exempt from the focus gate.
    session.handle(CaptureCommand::CaptureRequested).unwrap();
    for _ in 0..7 {
        take(&mut session);
        assert!(session.outcome().is_none());
    }
    let last = take(&mut session);
    assert!(last.contains(&CaptureSignal::PhaseCompleted(CapturePhase::Background)));
    assert_eq!(session.state(), CaptureState::Finalized);
    assert_eq!(photo_count(&bg_dir), 8);

    let outcome = session.outcome().unwrap();
    assert_eq!(outcome.trial_dir, dir.path().join("1"));
    assert_eq!(outcome.location, None);
    assert_eq!(last.last(), Some(&CaptureSignal::Finalized(outcome.clone())));
}

#[test]
fn rejected_capture_neither_advances_nor_persists() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = start(dir.path(), LatestFix::new());
    let sample_dir = session.trial_dir().join("sample");

    session.submit(CaptureCommand::CaptureRequested);
    session.submit(CaptureCommand::FocusResult(false));
    let signals = session.drain();
    assert_eq!(
        signals,
        vec![
            CaptureSignal::PleaseFocus,
            CaptureSignal::Rejected(CaptureError::FocusRequired),
            CaptureSignal::PleaseFocus,
        ]
    );
    assert_eq!(session.state(), CaptureState::AwaitingFocus);
    assert_eq!(photo_count(&sample_dir), 0);
    assert_eq!(session.pending(), 0);
}

#[test]
fn failed_shot_is_retried_with_same_index() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = start(dir.path(), LatestFix::new());
    session.handle(CaptureCommand::FocusResult(true)).unwrap();
    session.handle(CaptureCommand::CaptureRequested).unwrap();
    take(&mut session);

    let retry = session
        .handle(CaptureCommand::PhotoFailed("camera busy".to_string()))
        .unwrap();
    assert_eq!(
        retry,
        vec![CaptureSignal::TakePicture {
            phase: CapturePhase::Sample,
            shot: 1
        }]
    );
    let saved = take(&mut session);
    assert!(matches!(
        saved.first(),
        Some(CaptureSignal::PhotoSaved { shot: 1, path, .. }) if path.ends_with("sample/2.jpg")
    ));
}

#[test]
fn finalization_attaches_latest_fix() {
    let dir = tempfile::tempdir().unwrap();
    let host = LatestFix::new();
    let settings = CaptureSettings {
        max_pictures: 1,
        max_shot_retries: 1,
    };
    let mut session =
        CaptureSession::start(dir.path().join("1"), settings, FsPhotoStore, host.clone()).unwrap();

    let stamp = LocationStamp {
        latitude: 40.1,
        longitude: -88.2,
        fixed_at_epoch_ms: 1_700_000_000_000,
    };
    session.submit(CaptureCommand::FocusResult(true));
    session.submit(CaptureCommand::CaptureRequested);
    session.submit(CaptureCommand::PhotoTaken(vec![1]));
    session.drain();
    host.update(stamp);
    session.submit(CaptureCommand::CaptureRequested);
    session.submit(CaptureCommand::PhotoTaken(vec![2]));
    session.drain();

    assert_eq!(session.state(), CaptureState::Finalized);
    assert_eq!(session.outcome().unwrap().location, Some(stamp));
}

#[test]
fn abandon_ends_session_and_blocks_further_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = start(dir.path(), LatestFix::new());
    session.handle(CaptureCommand::FocusResult(true)).unwrap();
    session.submit(CaptureCommand::Abandon);
    session.submit(CaptureCommand::CaptureRequested);
    let signals = session.drain();
    assert_eq!(signals[0], CaptureSignal::Abandoned);
    assert!(matches!(
        signals[1],
        CaptureSignal::Rejected(CaptureError::InvalidCommand {
            state: "abandoned",
            command: "capture_requested"
        })
    ));
    assert_eq!(session.state(), CaptureState::Abandoned);
    assert!(session.outcome().is_none());
}
