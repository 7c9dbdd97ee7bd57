//! Presentation rounding and decimal formatting.
//!
//! Rounding works on the shortest round-trip decimal text of a value, so
//! `2.005` (stored as 2.00499999...) still rounds half-up to `2.01`.

/// Rounds `value` to `places` decimals, ties away from zero.
///
/// Non-finite values are returned unchanged.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    // `Display` for f64 never uses exponent notation.
    let text = value.abs().to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let places = places as usize;
    if frac_part.len() <= places {
        return value;
    }

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(places))
        .map(|b| b - b'0')
        .collect();
    if frac_part.as_bytes()[places] >= b'5' {
        increment_digits(&mut digits);
    }

    let split = digits.len() - places;
    let mut rounded = String::with_capacity(digits.len() + 2);
    if value.is_sign_negative() {
        rounded.push('-');
    }
    rounded.extend(digits[..split].iter().map(|d| char::from(b'0' + d)));
    if places > 0 {
        rounded.push('.');
        rounded.extend(digits[split..].iter().map(|d| char::from(b'0' + d)));
    }
    rounded.parse().unwrap_or(value)
}

fn increment_digits(digits: &mut Vec<u8>) {
    for digit in digits.iter_mut().rev() {
        if *digit == 9 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
    digits.insert(0, 1);
}

/// Text of an entered concentration: whole numbers print without a
/// fractional part (`10`), anything else as [`format_decimal`].
pub fn format_entered(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format_decimal(value)
    }
}

/// Shortest round-trip decimal text with a mandatory fractional part.
///
/// `2.0 -> "2.0"`, `0.125 -> "0.125"`, `-3.0 -> "-3.0"`.
pub fn format_decimal(value: f64) -> String {
    let mut text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        text.push_str(".0");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::{format_decimal, format_entered, round_half_up};

    #[test]
    fn ties_round_up_at_the_decimal_boundary() {
        assert_eq!(round_half_up(2.005, 2), 2.01);
        assert_eq!(round_half_up(0.125, 2), 0.13);
        assert_eq!(round_half_up(1.0005, 3), 1.001);
    }

    #[test]
    fn non_ties_round_to_nearest() {
        assert_eq!(round_half_up(2.004, 2), 2.0);
        assert_eq!(round_half_up(7.4999, 2), 7.5);
        assert_eq!(round_half_up(1.23456, 3), 1.235);
    }

    #[test]
    fn carry_propagates_into_integer_part() {
        assert_eq!(round_half_up(9.995, 2), 10.0);
        assert_eq!(round_half_up(99.5, 0), 100.0);
    }

    #[test]
    fn negative_ties_round_away_from_zero() {
        assert_eq!(round_half_up(-2.005, 2), -2.01);
        assert_eq!(round_half_up(-0.5, 0), -1.0);
    }

    #[test]
    fn short_values_and_non_finite_pass_through() {
        assert_eq!(round_half_up(7.5, 2), 7.5);
        assert_eq!(round_half_up(3.0, 3), 3.0);
        assert!(round_half_up(f64::NAN, 2).is_nan());
        assert_eq!(round_half_up(f64::INFINITY, 2), f64::INFINITY);
    }

    #[test]
    fn entered_whole_numbers_drop_the_fraction() {
        assert_eq!(format_entered(10.0), "10");
        assert_eq!(format_entered(20.0), "20");
        assert_eq!(format_entered(12.5), "12.5");
    }

    #[test]
    fn format_decimal_keeps_a_fractional_part() {
        assert_eq!(format_decimal(2.0), "2.0");
        assert_eq!(format_decimal(0.123), "0.123");
        assert_eq!(format_decimal(-3.0), "-3.0");
        assert_eq!(format_decimal(15.0), "15.0");
        assert_eq!(format_decimal(7.5), "7.5");
    }
}
