// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Defensive coercion of untrusted string values.
//!
//! Everything that arrives from a content frame is a string. These helpers
//! turn those strings into numbers and booleans without ever failing: a value
//! that cannot be interpreted yields the caller's default.

/// Trims a value and returns it, or `""` when absent.
#[must_use]
pub fn to_str(value: Option<&str>) -> &str {
    value.map_or("", str::trim)
}

/// Parses a finite number, clamped to `[min, max]`.
///
/// Returns `default` when `value` is absent, empty, not a number, or not
/// finite. A trailing `px` is accepted so that CSS pixel lengths coerce.
#[must_use]
pub fn to_num(value: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    let raw = to_str(value);
    let raw = raw.strip_suffix("px").unwrap_or(raw).trim_end();
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => n.clamp(min, max),
        _ => default,
    }
}

/// Parses an integer, clamped to `[min, max]`.
///
/// Fractional input is truncated toward zero.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "value is clamped to the i64 range before truncation"
)]
pub fn to_int(value: Option<&str>, default: i64, min: i64, max: i64) -> i64 {
    let n = to_num(value, f64::NAN, min as f64, max as f64);
    if n.is_nan() {
        default
    } else {
        (n.trunc() as i64).clamp(min, max)
    }
}

/// Interprets common truthy spellings (`1`, `true`, `yes`, `on`).
///
/// Everything else, including absence, is `false`.
#[must_use]
pub fn to_bool(value: Option<&str>) -> bool {
    matches!(
        to_str(value).to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_fall_back_to_default() {
        assert_eq!(to_num(None, 7.0, 0.0, 10.0), 7.0);
        assert_eq!(to_num(Some("abc"), 7.0, 0.0, 10.0), 7.0);
        assert_eq!(to_num(Some("NaN"), 7.0, 0.0, 10.0), 7.0);
        assert_eq!(to_num(Some("inf"), 7.0, 0.0, 10.0), 7.0);
    }

    #[test]
    fn numbers_clamp_and_accept_px() {
        assert_eq!(to_num(Some(" 250px "), 0.0, 0.0, 1000.0), 250.0);
        assert_eq!(to_num(Some("-5"), 0.0, 0.0, 10.0), 0.0);
        assert_eq!(to_num(Some("50"), 0.0, -100.0, 100.0), 50.0);
    }

    #[test]
    fn ints_truncate() {
        assert_eq!(to_int(Some("12.9"), 0, 0, 100), 12);
        assert_eq!(to_int(Some("-3.5"), 0, -10, 10), -3);
        assert_eq!(to_int(Some("x"), 4, 0, 10), 4);
    }

    #[test]
    fn bools() {
        assert!(to_bool(Some("1")));
        assert!(to_bool(Some("TRUE")));
        assert!(!to_bool(Some("0")));
        assert!(!to_bool(None));
    }
}
