//! Date similarity

use chrono::{Datelike, NaiveDate};

use crate::models::FieldValue;
use crate::similarity::MeasureError;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse a value as a date
///
/// Text is tried against ISO (`YYYY-MM-DD`), compact (`YYYYMMDD`), US
/// (`MM/DD/YYYY`) and European (`DD.MM.YYYY`) layouts.
pub fn parse_date(value: &FieldValue) -> Result<Option<NaiveDate>, MeasureError> {
    match value {
        FieldValue::Missing => Ok(None),
        FieldValue::Date(date) => Ok(Some(*date)),
        FieldValue::Text(text) => {
            let text = text.trim();
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .map(Some)
                .ok_or_else(|| MeasureError::new(format!("'{text}' is not a date")))
        }
    }
}

/// Date agreement
///
/// Equal dates score 1. Dates in the same year whose month and day are
/// transposed score `swap_month_day`. Everything else scores 0.
pub fn compare_dates(
    left: &FieldValue,
    right: &FieldValue,
    swap_month_day: f64,
    missing_value: f64,
) -> Result<f64, MeasureError> {
    let (Some(left), Some(right)) = (parse_date(left)?, parse_date(right)?) else {
        return Ok(missing_value);
    };
    if left == right {
        Ok(1.0)
    } else if left.year() == right.year()
        && left.month() == right.day()
        && left.day() == right.month()
    {
        Ok(swap_month_day)
    } else {
        Ok(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(1980, 3, 12);
        for text in ["1980-03-12", "19800312", "03/12/1980", "12.03.1980"] {
            assert_eq!(parse_date(&FieldValue::from(text)).unwrap(), expected, "{text}");
        }
        assert!(parse_date(&FieldValue::from("march")).is_err());
    }

    #[test]
    fn transposed_month_and_day() {
        let a = FieldValue::from("1980-03-12");
        let b = FieldValue::from("1980-12-03");
        let c = FieldValue::from("1981-12-03");

        assert_eq!(compare_dates(&a, &a, 0.5, 0.0).unwrap(), 1.0);
        assert_eq!(compare_dates(&a, &b, 0.5, 0.0).unwrap(), 0.5);
        assert_eq!(compare_dates(&a, &c, 0.5, 0.0).unwrap(), 0.0);
        assert_eq!(compare_dates(&a, &FieldValue::Missing, 0.5, 0.25).unwrap(), 0.25);
    }
}
