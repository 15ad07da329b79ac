//! Numeric similarity measures, including birth year and birth month/day

use chrono::Datelike;

use crate::models::FieldValue;
use crate::similarity::MeasureError;

/// Parse a value as a number
///
/// Missing values yield `Ok(None)`. Dates are read as their year.
pub fn parse_number(value: &FieldValue) -> Result<Option<f64>, MeasureError> {
    match value {
        FieldValue::Missing => Ok(None),
        FieldValue::Date(date) => Ok(Some(f64::from(date.year()))),
        FieldValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| MeasureError::new(format!("'{text}' is not a number"))),
    }
}

/// Linear decay of similarity with absolute difference
///
/// Differences up to `offset` score 1. Beyond that the score falls linearly
/// and reaches 0 at `offset + 2 * scale`.
#[must_use]
pub fn linear(left: f64, right: f64, offset: f64, scale: f64) -> f64 {
    let distance = (left - right).abs();
    if distance <= offset {
        1.0
    } else if distance >= offset + 2.0 * scale {
        0.0
    } else {
        1.0 - (distance - offset) / (2.0 * scale)
    }
}

/// Linear numeric similarity of two values
pub fn compare_numeric(
    left: &FieldValue,
    right: &FieldValue,
    offset: f64,
    scale: f64,
    missing_value: f64,
) -> Result<f64, MeasureError> {
    match (parse_number(left)?, parse_number(right)?) {
        (Some(left), Some(right)) => Ok(linear(left, right, offset, scale)),
        _ => Ok(missing_value),
    }
}

/// Birth year agreement
///
/// Equal years score 1. Years at most `year_dif` apart score `within`.
pub fn birth_year(
    left: &FieldValue,
    right: &FieldValue,
    within: f64,
    year_dif: f64,
    missing_value: f64,
) -> Result<f64, MeasureError> {
    match (parse_number(left)?, parse_number(right)?) {
        (Some(left), Some(right)) if left == right => Ok(1.0),
        (Some(left), Some(right)) if (left - right).abs() <= year_dif => Ok(within),
        (Some(_), Some(_)) => Ok(0.0),
        _ => Ok(missing_value),
    }
}

/// Birth month and day agreement
///
/// Both sides supply `[month, day]`. The checks are ordered: full agreement
/// scores 1, month and day transposed scores `swap`, agreement on one
/// component scores `either`, and only then does a missing component score
/// `missing_value`.
pub fn birth_month_day(
    left: [&FieldValue; 2],
    right: [&FieldValue; 2],
    swap: f64,
    either: f64,
    missing_value: f64,
) -> Result<f64, MeasureError> {
    let [left_month, left_day] = [parse_number(left[0])?, parse_number(left[1])?];
    let [right_month, right_day] = [parse_number(right[0])?, parse_number(right[1])?];

    let same = |a: Option<f64>, b: Option<f64>| matches!((a, b), (Some(a), Some(b)) if a == b);

    let month = same(left_month, right_month);
    let day = same(left_day, right_day);
    if month && day {
        return Ok(1.0);
    }
    if same(left_month, right_day) && same(left_day, right_month) {
        return Ok(swap);
    }
    if month || day {
        return Ok(either);
    }
    let any_missing = [left_month, left_day, right_month, right_day]
        .iter()
        .any(Option::is_none);
    Ok(if any_missing { missing_value } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(text: &str) -> FieldValue {
        FieldValue::from(text)
    }

    #[test]
    fn linear_decay() {
        assert_eq!(linear(10.0, 10.0, 0.0, 1.0), 1.0);
        assert_eq!(linear(10.0, 11.0, 0.0, 1.0), 0.5);
        assert_eq!(linear(10.0, 12.0, 0.0, 1.0), 0.0);
        assert_eq!(linear(10.0, 12.0, 2.0, 1.0), 1.0);
        assert_eq!(linear(10.0, 13.0, 2.0, 1.0), 0.5);
    }

    #[test]
    fn numeric_rejects_non_numbers() {
        let err = compare_numeric(&value("abc"), &value("1"), 0.0, 1.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("abc"));
        assert_eq!(
            compare_numeric(&FieldValue::Missing, &value("1"), 0.0, 1.0, 0.25).unwrap(),
            0.25
        );
    }

    #[test]
    fn birth_year_tiers() {
        assert_eq!(birth_year(&value("1980"), &value("1980"), 0.7, 1.0, 0.5).unwrap(), 1.0);
        assert_eq!(birth_year(&value("1980"), &value("1981"), 0.7, 1.0, 0.5).unwrap(), 0.7);
        assert_eq!(birth_year(&value("1980"), &value("1983"), 0.7, 1.0, 0.5).unwrap(), 0.0);
        assert_eq!(
            birth_year(&value("1980"), &FieldValue::Missing, 0.7, 1.0, 0.5).unwrap(),
            0.5
        );
        assert!(birth_year(&value("19x0"), &value("1980"), 0.7, 1.0, 0.5).is_err());
    }

    #[test]
    fn birth_month_day_tiers() {
        let score = |l: [&str; 2], r: [&str; 2]| {
            let l = [value(l[0]), value(l[1])];
            let r = [value(r[0]), value(r[1])];
            birth_month_day([&l[0], &l[1]], [&r[0], &r[1]], 0.8, 0.6, 0.5).unwrap()
        };

        assert_eq!(score(["3", "12"], ["3", "12"]), 1.0);
        assert_eq!(score(["3", "12"], ["12", "3"]), 0.8);
        assert_eq!(score(["3", "12"], ["3", "14"]), 0.6);
        assert_eq!(score(["3", ""], ["3", "14"]), 0.6);
        assert_eq!(score(["3", ""], ["4", "14"]), 0.5);
        assert_eq!(score(["3", "12"], ["4", "14"]), 0.0);
    }
}
