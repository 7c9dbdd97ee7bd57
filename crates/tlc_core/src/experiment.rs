//! Experiment directory intake and header record.
//!
//! # Responsibility
//! - Create (or reset) the per-experiment directory that hosts trial folders
//!   and the report file.
//! - Describe the experiment metadata appended as the report's header.
//!
//! # Invariants
//! - Experiment names are single path components.
//! - An existing directory is only emptied when overwrite is requested.

use crate::config::ReportFormat;
use crate::report::{ReportError, ReportWriter};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Metadata typed by the operator before the first trial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentInfo {
    pub name: String,
    pub day: String,
    pub user_id: String,
    pub user_name: String,
    pub phone_number: String,
    /// International non-proprietary drug name.
    pub drug_inn: String,
    pub lot_number: String,
    pub expiration_day: String,
    pub phone_id: String,
}

#[derive(Debug)]
pub enum ExperimentError {
    /// Name is blank or is not a single path component.
    InvalidName(String),
    /// Directory exists and overwrite was not requested.
    ExperimentExists(PathBuf),
    Io { path: PathBuf, source: std::io::Error },
    Report(ReportError),
}

impl Display for ExperimentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid experiment name `{name}`"),
            Self::ExperimentExists(path) => {
                write!(f, "experiment already exists at `{}`", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "experiment directory error at `{}`: {source}", path.display())
            }
            Self::Report(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ExperimentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Report(err) => Some(err),
            Self::InvalidName(_) | Self::ExperimentExists(_) => None,
        }
    }
}

impl From<ReportError> for ExperimentError {
    fn from(value: ReportError) -> Self {
        Self::Report(value)
    }
}

/// Creates `<root>/<name>`, emptying it first when `overwrite` is set.
///
/// # Errors
/// - [`ExperimentError::InvalidName`] for blank names, separators or `..`.
/// - [`ExperimentError::ExperimentExists`] when the directory exists and
///   `overwrite` is false.
/// - [`ExperimentError::Io`] when clearing or creating fails.
pub fn prepare_experiment_dir(
    root: &Path,
    name: &str,
    overwrite: bool,
) -> Result<PathBuf, ExperimentError> {
    let name = validate_name(name)?;
    let dir = root.join(name);

    if dir.exists() {
        if !overwrite {
            return Err(ExperimentError::ExperimentExists(dir));
        }
        clean_dir(&dir)?;
        warn!("event=experiment_prepare module=session status=ok overwritten=true");
    }

    std::fs::create_dir_all(&dir).map_err(|source| ExperimentError::Io {
        path: dir.clone(),
        source,
    })?;
    info!("event=experiment_prepare module=session status=ok");
    Ok(dir)
}

/// Prepares the directory and appends the header record to its report.
pub fn start_experiment(
    root: &Path,
    info: &ExperimentInfo,
    format: &ReportFormat,
    overwrite: bool,
) -> Result<PathBuf, ExperimentError> {
    let dir = prepare_experiment_dir(root, info.name.as_str(), overwrite)?;
    ReportWriter::for_experiment(&dir, format).append_experiment_header(info)?;
    Ok(dir)
}

fn validate_name(name: &str) -> Result<&str, ExperimentError> {
    let trimmed = name.trim();
    let is_single_component = !trimmed.is_empty()
        && trimmed != "."
        && !trimmed.contains("..")
        && !trimmed.contains(['/', '\\']);
    if !is_single_component {
        return Err(ExperimentError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

fn clean_dir(dir: &Path) -> Result<(), ExperimentError> {
    let io_err = |source| ExperimentError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.map_err(|source| ExperimentError::Io { path, source })?;
    }
    Ok(())
}
