//! Calibration engine state: spot columns, running sums and trials.
//!
//! # Invariants
//! - `columns.len()` is fixed at construction.
//! - Every recorded trial contributes to every column; the trial count is
//!   shared by all columns.
//! - `fit`/`predict`/`average` take `&self` and never mutate state.

use crate::calibration::fit::{fit_line, is_degenerate, CalibrationFit};
use crate::calibration::rounding::{format_decimal, format_entered, round_half_up};
use crate::config::{ColumnSetup, SessionConfig, DEFAULT_DISPLAY_PLACES};
use crate::model::measurement::{Role, SpotMeasurement};
use crate::model::trial::{LocationStamp, Trial};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Named precondition failures of calibration operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Measurement vector does not have one entry per column.
    ShapeMismatch { expected: usize, actual: usize },
    /// Fewer than two Standard columns.
    InsufficientStandards { found: usize },
    /// All Standard concentrations are identical.
    DegenerateFit,
    /// No column is marked Unknown.
    NoUnknowns,
    /// No trial has been recorded yet.
    NoTrials,
    /// A Standard column has no declared concentration.
    MissingConcentration(usize),
    /// Concentration is NaN or infinite.
    InvalidConcentration { column: usize, value: f64 },
    /// Column index outside `[0, num_columns)`.
    ColumnOutOfRange { column: usize, num_columns: usize },
    /// Fitted slope is zero; no concentration can be back-solved.
    FlatResponse,
}

impl Display for CalibrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch { expected, actual } => write!(
                f,
                "measurement count mismatch: expected {expected} spots, got {actual}"
            ),
            Self::InsufficientStandards { found } => write!(
                f,
                "number of standards is less than 2 (found {found})"
            ),
            Self::DegenerateFit => {
                write!(f, "standard concentrations must not all be identical")
            }
            Self::NoUnknowns => write!(f, "select at least 1 unknown"),
            Self::NoTrials => write!(f, "no trials recorded yet"),
            Self::MissingConcentration(column) => {
                write!(f, "empty standard concentration in column {column}")
            }
            Self::InvalidConcentration { column, value } => {
                write!(f, "concentration {value} in column {column} is not finite")
            }
            Self::ColumnOutOfRange {
                column,
                num_columns,
            } => write!(
                f,
                "column {column} out of range; session has {num_columns} columns"
            ),
            Self::FlatResponse => write!(f, "calibration slope is zero"),
        }
    }
}

impl Error for CalibrationError {}

/// One physical lane on the plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotColumn {
    pub role: Role,
    /// Declared concentration for Standards; last confirmed value otherwise.
    pub concentration: Option<f64>,
    /// Report text of `concentration`, as entered or as confirmed.
    #[serde(default)]
    concentration_text: Option<String>,
    rf_sum: f64,
    d_sum: f64,
}

impl SpotColumn {
    fn from_setup(setup: &ColumnSetup) -> Self {
        Self {
            role: setup.role,
            concentration: setup.concentration,
            concentration_text: setup.concentration.map(format_entered),
            rf_sum: 0.0,
            d_sum: 0.0,
        }
    }

    pub fn concentration_text(&self) -> Option<&str> {
        self.concentration_text.as_deref()
    }

    pub fn rf_sum(&self) -> f64 {
        self.rf_sum
    }

    pub fn d_sum(&self) -> f64 {
        self.d_sum
    }
}

/// Result of a successful `record_trial`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTrial {
    pub trial: Trial,
    /// Full-precision running averages after folding this trial.
    pub averages: Vec<SpotMeasurement>,
}

/// Back-solved concentrations keyed by Unknown column index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub fit: CalibrationFit,
    pub estimates: BTreeMap<usize, f64>,
}

/// Per-session calibration state.
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    columns: Vec<SpotColumn>,
    trials: Vec<Trial>,
    display_places: u32,
}

impl CalibrationEngine {
    /// Creates an engine with `num_columns` Unknown columns.
    pub fn new(num_columns: usize) -> Self {
        Self::with_setups(&vec![ColumnSetup::default(); num_columns], DEFAULT_DISPLAY_PLACES)
    }

    /// Creates an engine from explicit column setups.
    pub fn with_setups(setups: &[ColumnSetup], display_places: u32) -> Self {
        Self {
            columns: setups.iter().map(SpotColumn::from_setup).collect(),
            trials: Vec::new(),
            display_places,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::with_setups(&config.column_setups(), config.format.display_places)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[SpotColumn] {
        &self.columns
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn trial_count(&self) -> u32 {
        self.trials.len() as u32
    }

    /// Index the next recorded trial will receive.
    pub fn next_trial_index(&self) -> u32 {
        self.trial_count() + 1
    }

    /// Folds one trial into the running sums.
    ///
    /// # Errors
    /// - [`CalibrationError::ShapeMismatch`] when `measurements.len()` is not
    ///   `num_columns`; nothing is folded in that case.
    pub fn record_trial(
        &mut self,
        directory: PathBuf,
        measurements: Vec<SpotMeasurement>,
        location: Option<LocationStamp>,
    ) -> Result<RecordedTrial, CalibrationError> {
        if measurements.len() != self.columns.len() {
            warn!(
                "event=trial_rejected module=calibration status=rejected expected={} actual={}",
                self.columns.len(),
                measurements.len()
            );
            return Err(CalibrationError::ShapeMismatch {
                expected: self.columns.len(),
                actual: measurements.len(),
            });
        }

        for (column, spot) in self.columns.iter_mut().zip(&measurements) {
            column.rf_sum += spot.rf;
            column.d_sum += spot.d;
        }

        let trial = Trial {
            index: self.next_trial_index(),
            directory,
            measurements,
            location,
        };
        self.trials.push(trial.clone());
        info!(
            "event=trial_recorded module=calibration status=ok index={} columns={}",
            trial.index,
            self.columns.len()
        );

        Ok(RecordedTrial {
            trial,
            averages: self.averages()?,
        })
    }

    pub fn set_role(&mut self, column: usize, role: Role) -> Result<(), CalibrationError> {
        self.column_mut(column)?.role = role;
        debug!(
            "event=role_set module=calibration status=ok column={} role={}",
            column,
            role.tag()
        );
        Ok(())
    }

    /// Stores (or clears) the concentration entered for `column`.
    ///
    /// The role is left untouched; a value on an Unknown column is kept but
    /// ignored by [`CalibrationEngine::fit`].
    pub fn set_standard_concentration(
        &mut self,
        column: usize,
        value: Option<f64>,
    ) -> Result<(), CalibrationError> {
        if let Some(value) = value {
            if !value.is_finite() {
                return Err(CalibrationError::InvalidConcentration { column, value });
            }
        }
        let spot = self.column_mut(column)?;
        spot.concentration = value;
        spot.concentration_text = value.map(format_entered);
        Ok(())
    }

    /// Writes display-rounded estimates back as the columns' confirmed values.
    pub fn confirm_predictions(&mut self, prediction: &Prediction) -> Result<(), CalibrationError> {
        for (&column, &estimate) in &prediction.estimates {
            let rounded = round_half_up(estimate, self.display_places);
            let spot = self.column_mut(column)?;
            spot.concentration = Some(rounded);
            spot.concentration_text = Some(format_decimal(rounded));
        }
        Ok(())
    }

    /// Running `(Rf, D)` average of one column.
    pub fn average(&self, column: usize) -> Result<SpotMeasurement, CalibrationError> {
        let spot = self.column(column)?;
        let count = self.require_trials()?;
        Ok(SpotMeasurement::new(spot.rf_sum / count, spot.d_sum / count))
    }

    /// Running averages of every column, in column order.
    pub fn averages(&self) -> Result<Vec<SpotMeasurement>, CalibrationError> {
        (0..self.columns.len()).map(|column| self.average(column)).collect()
    }

    /// Averages rounded for on-screen display.
    pub fn display_averages(&self) -> Result<Vec<SpotMeasurement>, CalibrationError> {
        Ok(self
            .averages()?
            .into_iter()
            .map(|avg| {
                SpotMeasurement::new(
                    round_half_up(avg.rf, self.display_places),
                    round_half_up(avg.d, self.display_places),
                )
            })
            .collect())
    }

    /// Fits the standard curve through the current Standard columns.
    ///
    /// # Errors
    /// - [`CalibrationError::InsufficientStandards`] with fewer than 2 Standards.
    /// - [`CalibrationError::MissingConcentration`] for a Standard without value.
    /// - [`CalibrationError::DegenerateFit`] when all Standard values match.
    /// - [`CalibrationError::NoTrials`] before any trial is recorded.
    pub fn fit(&self) -> Result<CalibrationFit, CalibrationError> {
        let standards = self.columns_with_role(Role::Standard);
        if standards.len() < 2 {
            return Err(CalibrationError::InsufficientStandards {
                found: standards.len(),
            });
        }

        let mut xs = Vec::with_capacity(standards.len());
        for &column in &standards {
            let concentration = self.columns[column]
                .concentration
                .ok_or(CalibrationError::MissingConcentration(column))?;
            xs.push(concentration);
        }
        if is_degenerate(&xs) {
            return Err(CalibrationError::DegenerateFit);
        }

        let mut points = Vec::with_capacity(standards.len());
        for (&column, &x) in standards.iter().zip(&xs) {
            points.push((x, self.average(column)?.d));
        }
        let fit = fit_line(&points)?;
        info!(
            "event=calibration_fit module=calibration status=ok standards={} trials={}",
            fit.standards,
            self.trials.len()
        );
        Ok(fit)
    }

    /// Back-solves every Unknown column's concentration from `fit`.
    ///
    /// # Errors
    /// - [`CalibrationError::NoUnknowns`] when no column is Unknown.
    /// - [`CalibrationError::NoTrials`] before any trial is recorded.
    /// - [`CalibrationError::FlatResponse`] when `fit.slope` is zero.
    pub fn predict(&self, fit: &CalibrationFit) -> Result<Prediction, CalibrationError> {
        let unknowns = self.columns_with_role(Role::Unknown);
        if unknowns.is_empty() {
            return Err(CalibrationError::NoUnknowns);
        }

        let mut estimates = BTreeMap::new();
        for column in unknowns {
            let d_avg = self.average(column)?.d;
            estimates.insert(column, fit.concentration_for(d_avg)?);
        }
        Ok(Prediction {
            fit: *fit,
            estimates,
        })
    }

    /// Column indices currently holding `role`, ascending.
    pub fn columns_with_role(&self, role: Role) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.role == role)
            .map(|(index, _)| index)
            .collect()
    }

    fn require_trials(&self) -> Result<f64, CalibrationError> {
        if self.trials.is_empty() {
            return Err(CalibrationError::NoTrials);
        }
        Ok(self.trials.len() as f64)
    }

    fn column(&self, column: usize) -> Result<&SpotColumn, CalibrationError> {
        let num_columns = self.columns.len();
        self.columns
            .get(column)
            .ok_or(CalibrationError::ColumnOutOfRange {
                column,
                num_columns,
            })
    }

    fn column_mut(&mut self, column: usize) -> Result<&mut SpotColumn, CalibrationError> {
        let num_columns = self.columns.len();
        self.columns
            .get_mut(column)
            .ok_or(CalibrationError::ColumnOutOfRange {
                column,
                num_columns,
            })
    }
}
