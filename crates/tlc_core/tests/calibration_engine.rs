use std::path::PathBuf;
use tlc_core::{CalibrationEngine, CalibrationError, ColumnSetup, Role, SpotMeasurement};

const TOLERANCE: f64 = 1e-9;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() <= TOLERANCE,
        "expected {expected}, got {actual}"
    );
}

fn d_only(values: &[f64]) -> Vec<SpotMeasurement> {
    values.iter().map(|&d| SpotMeasurement::new(0.5, d)).collect()
}

fn record(engine: &mut CalibrationEngine, measurements: Vec<SpotMeasurement>) {
    let index = engine.next_trial_index();
    engine
        .record_trial(PathBuf::from(format!("/exp/{index}")), measurements, None)
        .unwrap();
}

fn standard(concentration: f64) -> ColumnSetup {
    ColumnSetup {
        role: Role::Standard,
        concentration: Some(concentration),
    }
}

#[test]
fn averages_equal_arithmetic_mean_of_raw_values() {
    let rows = [
        [(0.11, 3.5), (0.42, 7.25), (0.9, 1.0)],
        [(0.13, 4.5), (0.40, 6.75), (0.8, 2.0)],
        [(0.15, 2.0), (0.47, 9.00), (0.7, 3.5)],
        [(0.12, 5.0), (0.41, 8.00), (0.6, 0.5)],
    ];
    let mut engine = CalibrationEngine::new(3);
    for (k, row) in rows.iter().enumerate() {
        record(
            &mut engine,
            row.iter().map(|&(rf, d)| SpotMeasurement::new(rf, d)).collect(),
        );
        // Reads interleaved with writes must not disturb the sums.
        let _ = engine.averages().unwrap();

        let trials = (k + 1) as f64;
        for column in 0..3 {
            let rf_mean = rows[..=k].iter().map(|r| r[column].0).sum::<f64>() / trials;
            let d_mean = rows[..=k].iter().map(|r| r[column].1).sum::<f64>() / trials;
            let avg = engine.average(column).unwrap();
            assert_close(avg.rf, rf_mean);
            assert_close(avg.d, d_mean);
        }
    }
    assert_eq!(engine.trial_count(), 4);
}

#[test]
fn wrong_length_trial_leaves_state_unchanged() {
    let mut engine = CalibrationEngine::new(2);
    record(&mut engine, d_only(&[1.0, 2.0]));
    let before_sums: Vec<(f64, f64)> = engine
        .columns()
        .iter()
        .map(|column| (column.rf_sum(), column.d_sum()))
        .collect();

    for bad in [d_only(&[1.0]), d_only(&[1.0, 2.0, 3.0]), Vec::new()] {
        let actual = bad.len();
        let err = engine
            .record_trial(PathBuf::from("/exp/x"), bad, None)
            .unwrap_err();
        assert_eq!(err, CalibrationError::ShapeMismatch { expected: 2, actual });
    }

    let after_sums: Vec<(f64, f64)> = engine
        .columns()
        .iter()
        .map(|column| (column.rf_sum(), column.d_sum()))
        .collect();
    assert_eq!(before_sums, after_sums);
    assert_eq!(engine.trial_count(), 1);
    assert_eq!(engine.next_trial_index(), 2);
}

#[test]
fn perfect_line_fits_slope_two_intercept_zero() {
    let mut engine =
        CalibrationEngine::with_setups(&[standard(1.0), standard(2.0), standard(3.0)], 2);
    record(&mut engine, d_only(&[2.0, 4.0, 6.0]));
    let fit = engine.fit().unwrap();
    assert_close(fit.slope, 2.0);
    assert_close(fit.intercept, 0.0);
    assert_eq!(fit.standards, 3);
}

#[test]
fn fewer_than_two_standards_is_rejected() {
    let mut engine = CalibrationEngine::with_setups(&[standard(1.0), ColumnSetup::default()], 2);
    record(&mut engine, d_only(&[2.0, 4.0]));
    assert_eq!(
        engine.fit(),
        Err(CalibrationError::InsufficientStandards { found: 1 })
    );
}

#[test]
fn identical_standard_concentrations_are_degenerate() {
    let mut engine = CalibrationEngine::with_setups(&[standard(5.0), standard(5.0)], 2);
    record(&mut engine, d_only(&[2.0, 4.0]));
    assert_eq!(engine.fit(), Err(CalibrationError::DegenerateFit));
}

#[test]
fn standard_without_concentration_is_named() {
    let mut engine = CalibrationEngine::with_setups(
        &[
            standard(1.0),
            ColumnSetup {
                role: Role::Standard,
                concentration: None,
            },
        ],
        2,
    );
    record(&mut engine, d_only(&[2.0, 4.0]));
    assert_eq!(engine.fit(), Err(CalibrationError::MissingConcentration(1)));
}

#[test]
fn unknown_at_intercept_predicts_zero() {
    // Standards on D = 2x + 1; the unknown sits exactly at the intercept.
    let mut engine = CalibrationEngine::with_setups(
        &[standard(1.0), standard(2.0), ColumnSetup::default()],
        2,
    );
    record(&mut engine, d_only(&[3.0, 5.0, 1.0]));
    let fit = engine.fit().unwrap();
    assert_close(fit.intercept, 1.0);
    let prediction = engine.predict(&fit).unwrap();
    assert_close(prediction.estimates[&2], 0.0);
}

#[test]
fn predict_without_unknowns_is_rejected() {
    let mut engine = CalibrationEngine::with_setups(&[standard(1.0), standard(2.0)], 2);
    record(&mut engine, d_only(&[3.0, 5.0]));
    let fit = engine.fit().unwrap();
    assert_eq!(engine.predict(&fit), Err(CalibrationError::NoUnknowns));
}

#[test]
fn average_before_any_trial_is_rejected() {
    let engine = CalibrationEngine::new(2);
    assert_eq!(engine.average(0), Err(CalibrationError::NoTrials));
}

#[test]
fn refit_after_more_trials_uses_running_averages() {
    let mut engine = CalibrationEngine::with_setups(
        &[standard(10.0), standard(20.0), ColumnSetup::default()],
        2,
    );
    record(&mut engine, d_only(&[4.0, 8.0, 6.0]));
    let first = engine.fit().unwrap();
    assert_close(first.slope, 0.4);

    record(&mut engine, d_only(&[6.0, 12.0, 9.0]));
    let second = engine.fit().unwrap();
    assert_close(second.slope, 0.5);
    assert_close(second.intercept, 0.0);
    let prediction = engine.predict(&second).unwrap();
    assert_close(prediction.estimates[&2], 15.0);
}

#[test]
fn display_rounding_does_not_leak_into_fit() {
    let mut engine =
        CalibrationEngine::with_setups(&[standard(0.0), standard(1.0), ColumnSetup::default()], 2);
    record(&mut engine, d_only(&[0.0, 2.005, 1.0]));

    let display = engine.display_averages().unwrap();
    assert_eq!(display[1].d, 2.01);

    let fit = engine.fit().unwrap();
    assert_close(fit.slope, 2.005);
    assert_close(fit.intercept, 0.0);
}

#[test]
fn reassigning_roles_changes_the_next_fit() {
    let mut engine = CalibrationEngine::new(3);
    record(&mut engine, d_only(&[2.0, 4.0, 6.0]));
    for (column, value) in [(0, 1.0), (1, 2.0), (2, 3.0)] {
        engine.set_standard_concentration(column, Some(value)).unwrap();
    }
    engine.set_role(0, Role::Standard).unwrap();
    engine.set_role(1, Role::Standard).unwrap();
    let fit = engine.fit().unwrap();
    assert_eq!(fit.standards, 2);

    let prediction = engine.predict(&fit).unwrap();
    assert_close(prediction.estimates[&2], 3.0);

    engine.set_role(2, Role::Standard).unwrap();
    assert_eq!(engine.fit().unwrap().standards, 3);
    assert_eq!(engine.columns_with_role(Role::Unknown), Vec::<usize>::new());
}
