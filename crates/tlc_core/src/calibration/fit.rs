//! Closed-form least-squares line through calibration standards.

use crate::calibration::engine::CalibrationError;
use serde::{Deserialize, Serialize};

/// Relative size below which the normal-equation determinant counts as zero.
const DEGENERATE_RELATIVE_TOLERANCE: f64 = 1e-12;

/// Fitted line `D_avg = slope * concentration + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFit {
    pub slope: f64,
    pub intercept: f64,
    /// Number of standards the line was fitted through.
    pub standards: usize,
}

impl CalibrationFit {
    /// Concentration whose fitted signal equals `d_avg`.
    ///
    /// # Errors
    /// - [`CalibrationError::FlatResponse`] when the slope is zero.
    pub fn concentration_for(&self, d_avg: f64) -> Result<f64, CalibrationError> {
        if self.slope == 0.0 {
            return Err(CalibrationError::FlatResponse);
        }
        Ok((d_avg - self.intercept) / self.slope)
    }
}

/// First and second moments of `(x, y)` points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Moments {
    n: f64,
    s_x: f64,
    s_xx: f64,
    s_y: f64,
    s_xy: f64,
}

impl Moments {
    fn accumulate(points: &[(f64, f64)]) -> Self {
        points
            .iter()
            .fold(Self::default(), |acc, &(x, y)| Self {
                n: acc.n + 1.0,
                s_x: acc.s_x + x,
                s_xx: acc.s_xx + x * x,
                s_y: acc.s_y + y,
                s_xy: acc.s_xy + x * y,
            })
    }

    fn determinant(&self) -> f64 {
        self.n * self.s_xx - self.s_x * self.s_x
    }
}

/// Returns `true` when `xs` cannot support a line fit (fewer than two
/// distinct values, numerically).
pub fn is_degenerate(xs: &[f64]) -> bool {
    let points: Vec<(f64, f64)> = xs.iter().map(|&x| (x, 0.0)).collect();
    let moments = Moments::accumulate(&points);
    determinant_is_zero(&moments)
}

fn determinant_is_zero(moments: &Moments) -> bool {
    let det = moments.determinant();
    det.abs() <= DEGENERATE_RELATIVE_TOLERANCE * (moments.n * moments.s_xx).abs()
}

/// Solves the 2x2 normal equations by Cramer's rule.
///
/// `points` are `(concentration, d_avg)` pairs.
///
/// # Errors
/// - [`CalibrationError::InsufficientStandards`] for fewer than two points.
/// - [`CalibrationError::DegenerateFit`] when every concentration is equal.
pub fn fit_line(points: &[(f64, f64)]) -> Result<CalibrationFit, CalibrationError> {
    if points.len() < 2 {
        return Err(CalibrationError::InsufficientStandards {
            found: points.len(),
        });
    }

    let m = Moments::accumulate(points);
    if determinant_is_zero(&m) {
        return Err(CalibrationError::DegenerateFit);
    }
    let det = m.determinant();
    let slope = (m.n * m.s_xy - m.s_x * m.s_y) / det;
    let intercept = (m.s_xx * m.s_y - m.s_x * m.s_xy) / det;

    Ok(CalibrationFit {
        slope,
        intercept,
        standards: points.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::{fit_line, is_degenerate, CalibrationFit};
    use crate::calibration::engine::CalibrationError;

    const TOL: f64 = 1e-9;

    #[test]
    fn perfect_line_recovers_slope_and_zero_intercept() {
        let fit = fit_line(&[(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)]).expect("fit");
        assert!((fit.slope - 2.0).abs() < TOL);
        assert!(fit.intercept.abs() < TOL);
        assert_eq!(fit.standards, 3);
    }

    #[test]
    fn offset_line_recovers_intercept() {
        let fit = fit_line(&[(0.0, 1.0), (2.0, 2.0), (4.0, 3.0), (6.0, 4.0)]).expect("fit");
        assert!((fit.slope - 0.5).abs() < TOL);
        assert!((fit.intercept - 1.0).abs() < TOL);
    }

    #[test]
    fn noisy_points_match_textbook_regression() {
        // x = 1..4, y = 1, 3, 2, 4 -> slope 0.8, intercept 0.5
        let fit = fit_line(&[(1.0, 1.0), (2.0, 3.0), (3.0, 2.0), (4.0, 4.0)]).expect("fit");
        assert!((fit.slope - 0.8).abs() < TOL);
        assert!((fit.intercept - 0.5).abs() < TOL);
    }

    #[test]
    fn single_point_is_insufficient() {
        assert_eq!(
            fit_line(&[(1.0, 2.0)]),
            Err(CalibrationError::InsufficientStandards { found: 1 })
        );
    }

    #[test]
    fn identical_concentrations_are_degenerate() {
        assert_eq!(
            fit_line(&[(5.0, 2.0), (5.0, 4.0)]),
            Err(CalibrationError::DegenerateFit)
        );
        assert!(is_degenerate(&[0.1, 0.1, 0.1]));
        assert!(!is_degenerate(&[0.1, 0.2]));
    }

    #[test]
    fn flat_line_cannot_back_solve() {
        let fit = CalibrationFit {
            slope: 0.0,
            intercept: 3.0,
            standards: 2,
        };
        assert_eq!(
            fit.concentration_for(3.0),
            Err(CalibrationError::FlatResponse)
        );
    }

    #[test]
    fn signal_at_intercept_maps_to_zero_concentration() {
        let fit = CalibrationFit {
            slope: 0.5,
            intercept: 1.25,
            standards: 2,
        };
        assert_eq!(fit.concentration_for(1.25), Ok(0.0));
        assert_eq!(fit.concentration_for(3.25), Ok(4.0));
    }
}
