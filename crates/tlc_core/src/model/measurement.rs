//! Per-spot measurements and column roles.

use serde::{Deserialize, Serialize};

/// One reduced spot: retardation factor and darkness/intensity proxy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpotMeasurement {
    /// Normalised migration distance.
    pub rf: f64,
    /// Signal used as the dependent variable of the calibration line.
    pub d: f64,
}

impl SpotMeasurement {
    pub fn new(rf: f64, d: f64) -> Self {
        Self { rf, d }
    }
}

/// Calibration role of one spot column.
///
/// Role is always set explicitly; typing a concentration never changes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Known concentration, used to fit the line.
    Standard,
    /// Concentration to be predicted from the line.
    #[default]
    Unknown,
}

/// Report tag for [`Role::Standard`].
pub const ROLE_TAG_STANDARD: &str = "std";
/// Report tag for [`Role::Unknown`].
pub const ROLE_TAG_UNKNOWN: &str = "unknown";

impl Role {
    /// Stable tag written into the final-summary record.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Standard => ROLE_TAG_STANDARD,
            Self::Unknown => ROLE_TAG_UNKNOWN,
        }
    }

    /// Parses a report/UI tag back into a role.
    pub fn from_tag(value: &str) -> Option<Self> {
        match value.trim() {
            ROLE_TAG_STANDARD => Some(Self::Standard),
            ROLE_TAG_UNKNOWN => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Splits a reducer's flat `Rf0, D0, Rf1, D1, ...` output into measurements.
///
/// Returns `None` unless `values.len() == 2 * num_columns`; a short or long
/// vector is a failed reduction, never partial data.
pub fn measurements_from_flat(values: &[f64], num_columns: usize) -> Option<Vec<SpotMeasurement>> {
    if num_columns == 0 || values.len() != 2 * num_columns {
        return None;
    }
    Some(
        values
            .chunks_exact(2)
            .map(|pair| SpotMeasurement::new(pair[0], pair[1]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::{measurements_from_flat, Role, SpotMeasurement};

    #[test]
    fn flat_vector_pairs_rf_with_d_in_column_order() {
        let spots = measurements_from_flat(&[0.1, 5.0, 0.2, 6.0], 2).expect("valid shape");
        assert_eq!(
            spots,
            vec![SpotMeasurement::new(0.1, 5.0), SpotMeasurement::new(0.2, 6.0)]
        );
    }

    #[test]
    fn flat_vector_with_wrong_length_is_rejected() {
        assert!(measurements_from_flat(&[0.1, 5.0, 0.2], 2).is_none());
        assert!(measurements_from_flat(&[0.1, 5.0, 0.2, 6.0, 0.3, 7.0], 2).is_none());
        assert!(measurements_from_flat(&[], 0).is_none());
    }

    #[test]
    fn role_tags_round_trip() {
        assert_eq!(Role::Standard.tag(), "std");
        assert_eq!(Role::from_tag(" unknown "), Some(Role::Unknown));
        assert_eq!(Role::from_tag("blank"), None);
        assert_eq!(Role::default(), Role::Unknown);
    }
}
