//! Append-only writer for the experiment report file.

use crate::config::ReportFormat;
use crate::experiment::ExperimentInfo;
use crate::model::trial::{LocationStamp, Trial};
use crate::report::format::{
    render_experiment_header, render_final_summary, render_location_record, render_trial_record,
    FinalSummary,
};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Report append failure.
#[derive(Debug)]
pub enum ReportError {
    Io { path: PathBuf, source: std::io::Error },
}

impl Display for ReportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to append report `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ReportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// Appends rendered records to one report file.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
    report_places: u32,
}

impl ReportWriter {
    pub fn new(path: PathBuf, report_places: u32) -> Self {
        Self {
            path,
            report_places,
        }
    }

    /// Writer for `<root_dir>/<log_file_name>`.
    pub fn for_experiment(root_dir: &Path, format: &ReportFormat) -> Self {
        Self::new(
            root_dir.join(format.log_file_name.as_str()),
            format.report_places,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_trial(&self, trial: &Trial) -> Result<(), ReportError> {
        self.append("trial", &render_trial_record(trial))
    }

    /// Location record followed by the trial record, in one write.
    pub fn append_captured_trial(
        &self,
        trial: &Trial,
        location: Option<&LocationStamp>,
    ) -> Result<(), ReportError> {
        let mut text = render_location_record(location);
        text.push_str(&render_trial_record(trial));
        self.append("captured_trial", &text)
    }

    pub fn append_experiment_header(&self, info: &ExperimentInfo) -> Result<(), ReportError> {
        self.append("experiment_header", &render_experiment_header(info))
    }

    pub fn append_final_summary(&self, summary: &FinalSummary) -> Result<(), ReportError> {
        self.append(
            "final_summary",
            &render_final_summary(summary, self.report_places),
        )
    }

    fn append(&self, record: &str, text: &str) -> Result<(), ReportError> {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                file.write_all(text.as_bytes())?;
                file.flush()
            });

        match result {
            Ok(()) => {
                info!(
                    "event=report_append module=report status=ok record={} bytes={}",
                    record,
                    text.len()
                );
                Ok(())
            }
            Err(source) => {
                error!(
                    "event=report_append module=report status=error record={} kind={:?}",
                    record,
                    source.kind()
                );
                Err(ReportError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }
}
