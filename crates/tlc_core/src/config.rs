//! Result-session intake parameters.
//!
//! # Responsibility
//! - Describe everything a caller hands over when a result session starts.
//! - Validate once, up front, so downstream components can trust the shape.
//!
//! # Invariants
//! - `num_columns >= 1` and is fixed for the session.
//! - `columns` is either empty (all Unknown) or exactly `num_columns` long.

use crate::model::measurement::Role;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_NUM_COLUMNS: usize = 3;
pub const DEFAULT_MAX_PICTURES: u32 = 8;
pub const DEFAULT_MAX_SHOT_RETRIES: u32 = 3;
pub const DEFAULT_DISPLAY_PLACES: u32 = 2;
pub const DEFAULT_REPORT_PLACES: u32 = 3;
pub const DEFAULT_LOG_FILE_NAME: &str = "log.txt";
pub const SAMPLE_FOLDER: &str = "sample";
pub const BG_FOLDER: &str = "bg";

/// Initial role/concentration of one spot column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSetup {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub concentration: Option<f64>,
}

/// Rounding places and file naming used when values leave the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportFormat {
    /// Places for on-screen averages and confirmed predictions.
    pub display_places: u32,
    /// Places for the final-summary averages.
    pub report_places: u32,
    /// Append-only log file inside the experiment directory.
    pub log_file_name: String,
}

impl Default for ReportFormat {
    fn default() -> Self {
        Self {
            display_places: DEFAULT_DISPLAY_PLACES,
            report_places: DEFAULT_REPORT_PLACES,
            log_file_name: DEFAULT_LOG_FILE_NAME.to_string(),
        }
    }
}

/// Parameters of one result session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Experiment directory; trials land in `<root_dir>/<index>`.
    pub root_dir: PathBuf,
    #[serde(default = "default_num_columns")]
    pub num_columns: usize,
    #[serde(default)]
    pub columns: Vec<ColumnSetup>,
    #[serde(default = "default_max_pictures")]
    pub max_pictures: u32,
    #[serde(default = "default_max_shot_retries")]
    pub max_shot_retries: u32,
    #[serde(flatten)]
    pub format: ReportFormat,
}

fn default_num_columns() -> usize {
    DEFAULT_NUM_COLUMNS
}

fn default_max_pictures() -> u32 {
    DEFAULT_MAX_PICTURES
}

fn default_max_shot_retries() -> u32 {
    DEFAULT_MAX_SHOT_RETRIES
}

/// Config validation/loading failure naming the offending field.
#[derive(Debug)]
pub enum ConfigError {
    InvalidField { field: &'static str, reason: String },
    Read(std::io::Error),
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidField { field, reason } => write!(f, "invalid `{field}`: {reason}"),
            Self::Read(err) => write!(f, "failed to read session config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse session config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::InvalidField { .. } => None,
        }
    }
}

impl SessionConfig {
    /// Defaults for everything except the experiment directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            num_columns: DEFAULT_NUM_COLUMNS,
            columns: Vec::new(),
            max_pictures: DEFAULT_MAX_PICTURES,
            max_shot_retries: DEFAULT_MAX_SHOT_RETRIES,
            format: ReportFormat::default(),
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        Self::from_json(raw.as_str())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root_dir.is_absolute() {
            return Err(invalid(
                "root_dir",
                format!("must be absolute, got `{}`", self.root_dir.display()),
            ));
        }
        if self.num_columns == 0 {
            return Err(invalid("num_columns", "must be at least 1".to_string()));
        }
        if !self.columns.is_empty() && self.columns.len() != self.num_columns {
            return Err(invalid(
                "columns",
                format!(
                    "expected {} entries, got {}",
                    self.num_columns,
                    self.columns.len()
                ),
            ));
        }
        if self.max_pictures == 0 {
            return Err(invalid("max_pictures", "must be at least 1".to_string()));
        }
        if self.max_shot_retries == 0 {
            return Err(invalid(
                "max_shot_retries",
                "must be at least 1".to_string(),
            ));
        }
        let file_name = self.format.log_file_name.trim();
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(invalid(
                "log_file_name",
                "must be a plain, non-empty file name".to_string(),
            ));
        }
        Ok(())
    }

    /// Column setups padded to `num_columns` (missing entries are Unknown).
    pub fn column_setups(&self) -> Vec<ColumnSetup> {
        let mut setups = self.columns.clone();
        setups.resize(self.num_columns, ColumnSetup::default());
        setups
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidField { field, reason }
}
