//! Byte-exact rendering of report records.

use crate::calibration::engine::{CalibrationEngine, CalibrationError};
use crate::calibration::rounding::{format_decimal, round_half_up};
use crate::experiment::ExperimentInfo;
use crate::model::measurement::{Role, SpotMeasurement};
use crate::model::trial::{LocationStamp, Trial};

const CRLF: &str = "\r\n";
const LF: &str = "\n";

/// One column of the final summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryColumn {
    pub role: Role,
    /// Last entered or confirmed value; blank in the report when absent.
    pub concentration: Option<String>,
    /// Unrounded running average.
    pub average: SpotMeasurement,
}

/// Snapshot of the engine written once when a session finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalSummary {
    pub columns: Vec<SummaryColumn>,
}

impl FinalSummary {
    /// Captures roles, confirmed concentrations and averages.
    ///
    /// # Errors
    /// - [`CalibrationError::NoTrials`] when nothing was recorded.
    pub fn from_engine(engine: &CalibrationEngine) -> Result<Self, CalibrationError> {
        let averages = engine.averages()?;
        let columns = engine
            .columns()
            .iter()
            .zip(averages)
            .map(|(column, average)| SummaryColumn {
                role: column.role,
                concentration: column.concentration_text().map(str::to_owned),
                average,
            })
            .collect();
        Ok(Self { columns })
    }
}

/// `Trial N:` followed by the raw `(Rf, D)` of every spot.
pub fn render_trial_record(trial: &Trial) -> String {
    let mut out = format!("Trial {}:{CRLF}", trial.index);
    for (column, spot) in trial.measurements.iter().enumerate() {
        out.push_str(&format!("\tSpot {column}:{CRLF}"));
        out.push_str(&format!("\t\tRf: {}{CRLF}", format_decimal(spot.rf)));
        out.push_str(&format!("\t\tD: {}{CRLF}", format_decimal(spot.d)));
    }
    out
}

/// Roles, concentrations and averages rounded to `places`.
pub fn render_final_summary(summary: &FinalSummary, places: u32) -> String {
    let mut out = format!("Final Result:{CRLF}");

    for column in &summary.columns {
        out.push_str(&format!("\t{}\t", column.role.tag()));
    }
    out.push_str(CRLF);

    for column in &summary.columns {
        let value = column.concentration.as_deref().unwrap_or_default();
        out.push_str(&format!("\t{value}\t"));
    }
    out.push_str(CRLF);

    for _ in &summary.columns {
        out.push_str("\tRf\tD");
    }
    out.push_str(CRLF);

    for column in &summary.columns {
        out.push_str(&format!(
            "\t{}\t{}",
            format_decimal(round_half_up(column.average.rf, places)),
            format_decimal(round_half_up(column.average.d, places))
        ));
    }
    out.push_str(CRLF);
    out
}

pub fn render_location_record(location: Option<&LocationStamp>) -> String {
    match location {
        None => format!("Location: unknown{CRLF}"),
        Some(stamp) => format!(
            "Location:{CRLF}\tLatitude: {}{CRLF}\tLongitude: {}{CRLF}\tTime: {}{CRLF}",
            format_decimal(stamp.latitude),
            format_decimal(stamp.longitude),
            stamp.fixed_at_epoch_ms
        ),
    }
}

pub fn render_experiment_header(info: &ExperimentInfo) -> String {
    let fields = [
        ("Experiment Name", info.name.as_str()),
        ("Experiment Day", info.day.as_str()),
        ("User ID", info.user_id.as_str()),
        ("User Name", info.user_name.as_str()),
        ("Phone Number", info.phone_number.as_str()),
        ("Drug Name (INN)", info.drug_inn.as_str()),
        ("Lot Number", info.lot_number.as_str()),
        ("Expiration Day", info.expiration_day.as_str()),
        ("Phone ID", info.phone_id.as_str()),
    ];
    fields
        .iter()
        .map(|(label, value)| format!("{label}: {}{LF}", single_line(value)))
        .collect()
}

fn single_line(value: &str) -> String {
    value.trim().replace(['\r', '\n'], " ")
}
