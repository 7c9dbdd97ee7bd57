//! Photo persistence for capture sessions.

use crate::capture::CapturePhase;
use crate::config::{BG_FOLDER, SAMPLE_FOLDER};
use std::io;
use std::path::{Path, PathBuf};

/// Deterministic file name of the `shot_number`-th photo (1-based).
pub fn photo_file_name(shot_number: u32) -> String {
    format!("{shot_number}.jpg")
}

/// Destination of photos taken during a capture session.
pub trait PhotoStore {
    /// Creates the per-phase directories under `trial_dir`.
    fn prepare(&mut self, trial_dir: &Path) -> io::Result<()>;

    /// Writes one encoded photo and returns its path.
    ///
    /// `shot_number` is 1-based.
    fn persist(
        &mut self,
        trial_dir: &Path,
        phase: CapturePhase,
        shot_number: u32,
        bytes: &[u8],
    ) -> io::Result<PathBuf>;
}

/// Filesystem store: `<trial_dir>/sample/<n>.jpg`, `<trial_dir>/bg/<n>.jpg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPhotoStore;

impl PhotoStore for FsPhotoStore {
    fn prepare(&mut self, trial_dir: &Path) -> io::Result<()> {
        for folder in [SAMPLE_FOLDER, BG_FOLDER] {
            std::fs::create_dir_all(trial_dir.join(folder))?;
        }
        Ok(())
    }

    fn persist(
        &mut self,
        trial_dir: &Path,
        phase: CapturePhase,
        shot_number: u32,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let dir = trial_dir.join(phase.folder());
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(photo_file_name(shot_number));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}
