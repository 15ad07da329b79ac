//! Similarity measures
//!
//! A [`Measure`] scores the values of one comparison for a candidate pair.
//! Measures are looked up by name in a [`MeasureCatalog`] when a run is
//! planned, so an unknown name or a bad parameter is reported before any
//! pair is scored. New measures plug in through the [`SimilarityMeasure`]
//! trait and [`MeasureCatalog::register_measure`].

pub mod date;
pub mod numeric;
pub mod string;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LinkageError, Result};
use crate::models::FieldValue;

/// Failure of a measure on one pair of values, e.g. an unparseable year
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MeasureError(String);

impl MeasureError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// A user-supplied similarity measure
///
/// `arity` is the number of fields read from each side. The slices passed
/// to [`SimilarityMeasure::score`] always have exactly that length.
pub trait SimilarityMeasure: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn arity(&self) -> usize {
        1
    }

    fn score(&self, left: &[&FieldValue], right: &[&FieldValue]) -> std::result::Result<f64, MeasureError>;
}

/// Parameters of a comparison as written in the configuration
///
/// Only the parameters meaningful for the chosen measure are read.
/// Anything else is kept in `extra` for custom measure factories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureParams {
    /// Score when a value is missing on either side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_value: Option<f64>,
    /// Birth year: score for years within `year_dif`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_1y: Option<f64>,
    /// Birth year: largest year difference still scored `within_1y`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_dif: Option<f64>,
    /// Dates and birth month/day: score for transposed month and day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_month_day: Option<f64>,
    /// Birth month/day: score when only one component agrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub either_month_day: Option<f64>,
    /// Middle initial: score for matching initials without a clear middle name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minit_match_mname_unclear: Option<f64>,
    /// Numeric: difference still scored 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    /// Numeric: half the width of the linear decay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MeasureParams {
    #[must_use]
    pub fn missing(missing_value: f64) -> Self {
        Self {
            missing_value: Some(missing_value),
            ..Self::default()
        }
    }
}

/// Parameters of the linear numeric measure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericParams {
    pub offset: f64,
    pub scale: f64,
    pub missing_value: f64,
}

/// Parameters of the date measure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateParams {
    pub swap_month_day: f64,
    pub missing_value: f64,
}

/// Parameters of the birth year measure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BirthYearParams {
    pub within: f64,
    pub year_dif: f64,
    pub missing_value: f64,
}

/// Parameters of the birth month/day measure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthDayParams {
    pub swap: f64,
    pub either: f64,
    pub missing_value: f64,
}

/// Parameters of the middle initial measure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiddleInitialParams {
    pub unclear: f64,
    pub missing_value: f64,
}

/// A resolved similarity measure with its parameters
#[derive(Debug, Clone)]
pub enum Measure {
    Exact { missing_value: f64 },
    JaroWinkler { missing_value: f64 },
    Levenshtein { missing_value: f64 },
    Numeric(NumericParams),
    Date(DateParams),
    BirthYear(BirthYearParams),
    BirthMonthDay(MonthDayParams),
    MiddleInitial(MiddleInitialParams),
    Custom(Arc<dyn SimilarityMeasure>),
}

impl Measure {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Exact { .. } => "exact",
            Self::JaroWinkler { .. } => "jarowinkler",
            Self::Levenshtein { .. } => "levenshtein",
            Self::Numeric(_) => "numeric",
            Self::Date(_) => "date",
            Self::BirthYear(_) => "byear",
            Self::BirthMonthDay(_) => "bmonthbday",
            Self::MiddleInitial(_) => "minitial",
            Self::Custom(measure) => measure.name(),
        }
    }

    /// Number of fields read from each side
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::BirthMonthDay(_) | Self::MiddleInitial(_) => 2,
            Self::Custom(measure) => measure.arity(),
            _ => 1,
        }
    }

    /// Score one pair of value lists
    ///
    /// Both slices must hold [`Measure::arity`] values.
    pub fn score(
        &self,
        left: &[&FieldValue],
        right: &[&FieldValue],
    ) -> std::result::Result<f64, MeasureError> {
        let arity = self.arity();
        if left.len() != arity || right.len() != arity {
            return Err(MeasureError::new(format!(
                "measure '{}' expects {arity} value(s) per side",
                self.name()
            )));
        }

        match self {
            Self::Exact { missing_value } => {
                Ok(string::compare_text(left[0], right[0], *missing_value, string::exact))
            }
            Self::JaroWinkler { missing_value } => Ok(string::compare_text(
                left[0],
                right[0],
                *missing_value,
                string::jaro_winkler,
            )),
            Self::Levenshtein { missing_value } => Ok(string::compare_text(
                left[0],
                right[0],
                *missing_value,
                string::levenshtein,
            )),
            Self::Numeric(p) => {
                numeric::compare_numeric(left[0], right[0], p.offset, p.scale, p.missing_value)
            }
            Self::Date(p) => {
                date::compare_dates(left[0], right[0], p.swap_month_day, p.missing_value)
            }
            Self::BirthYear(p) => {
                numeric::birth_year(left[0], right[0], p.within, p.year_dif, p.missing_value)
            }
            Self::BirthMonthDay(p) => numeric::birth_month_day(
                [left[0], left[1]],
                [right[0], right[1]],
                p.swap,
                p.either,
                p.missing_value,
            ),
            Self::MiddleInitial(p) => Ok(string::middle_initial(
                [left[0], left[1]],
                [right[0], right[1]],
                p.unclear,
                p.missing_value,
            )),
            Self::Custom(measure) => measure.score(left, right),
        }
    }
}

/// Builds a [`Measure`] for a named comparison from its parameters
pub type MeasureFactory = Arc<dyn Fn(&str, &MeasureParams) -> Result<Measure> + Send + Sync>;

/// Registry of named measures
#[derive(Clone)]
pub struct MeasureCatalog {
    factories: BTreeMap<String, MeasureFactory>,
}

impl fmt::Debug for MeasureCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasureCatalog")
            .field("measures", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for MeasureCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl MeasureCatalog {
    /// Catalog without any measures
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Catalog holding the built-in measures
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut catalog = Self::empty();
        catalog.register("exact", |name, params| {
            Ok(Measure::Exact {
                missing_value: missing_value(name, params)?,
            })
        });
        catalog.register("jarowinkler", |name, params| {
            Ok(Measure::JaroWinkler {
                missing_value: missing_value(name, params)?,
            })
        });
        catalog.register("levenshtein", |name, params| {
            Ok(Measure::Levenshtein {
                missing_value: missing_value(name, params)?,
            })
        });
        catalog.register("numeric", |name, params| {
            let scale = optional(name, "scale", params.scale, 1.0)?;
            if scale <= 0.0 {
                return Err(invalid(name, "scale must be positive"));
            }
            let offset = optional(name, "offset", params.offset, 0.0)?;
            if offset < 0.0 {
                return Err(invalid(name, "offset must not be negative"));
            }
            Ok(Measure::Numeric(NumericParams {
                offset,
                scale,
                missing_value: missing_value(name, params)?,
            }))
        });
        catalog.register("date", |name, params| {
            Ok(Measure::Date(DateParams {
                swap_month_day: optional(name, "swap_month_day", params.swap_month_day, 0.5)?,
                missing_value: missing_value(name, params)?,
            }))
        });
        catalog.register("byear", |name, params| {
            let year_dif = optional(name, "year_dif", params.year_dif, 1.0)?;
            if year_dif < 0.0 {
                return Err(invalid(name, "year_dif must not be negative"));
            }
            Ok(Measure::BirthYear(BirthYearParams {
                within: required(name, "within_1y", params.within_1y)?,
                year_dif,
                missing_value: missing_value(name, params)?,
            }))
        });
        catalog.register("bmonthbday", |name, params| {
            Ok(Measure::BirthMonthDay(MonthDayParams {
                swap: required(name, "swap_month_day", params.swap_month_day)?,
                either: required(name, "either_month_day", params.either_month_day)?,
                missing_value: missing_value(name, params)?,
            }))
        });
        catalog.register("minitial", |name, params| {
            Ok(Measure::MiddleInitial(MiddleInitialParams {
                unclear: required(
                    name,
                    "minit_match_mname_unclear",
                    params.minit_match_mname_unclear,
                )?,
                missing_value: missing_value(name, params)?,
            }))
        });
        catalog
    }

    /// Register or replace a measure factory
    pub fn register<F>(&mut self, measure: impl Into<String>, factory: F)
    where
        F: Fn(&str, &MeasureParams) -> Result<Measure> + Send + Sync + 'static,
    {
        self.factories.insert(measure.into(), Arc::new(factory));
    }

    /// Register a parameterless custom measure under its own name
    pub fn register_measure(&mut self, measure: Arc<dyn SimilarityMeasure>) {
        let name = measure.name().to_string();
        self.register(name, move |_, _| Ok(Measure::Custom(Arc::clone(&measure))));
    }

    #[must_use]
    pub fn contains(&self, measure: &str) -> bool {
        self.factories.contains_key(measure)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Resolve the measure of a named comparison
    ///
    /// # Errors
    ///
    /// [`LinkageError::UnknownMeasure`] when `measure` is not registered, or
    /// whatever the factory reports for invalid parameters.
    pub fn resolve(&self, comparison: &str, measure: &str, params: &MeasureParams) -> Result<Measure> {
        let factory = self
            .factories
            .get(measure)
            .ok_or_else(|| LinkageError::UnknownMeasure {
                comparison: comparison.to_string(),
                measure: measure.to_string(),
            })?;
        factory(comparison, params)
    }
}

fn invalid(comparison: &str, reason: impl Into<String>) -> LinkageError {
    LinkageError::InvalidMeasureParameter {
        comparison: comparison.to_string(),
        reason: reason.into(),
    }
}

fn finite(comparison: &str, parameter: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(comparison, format!("{parameter} must be a finite number")))
    }
}

fn required(comparison: &str, parameter: &str, value: Option<f64>) -> Result<f64> {
    let value = value.ok_or_else(|| invalid(comparison, format!("{parameter} is required")))?;
    finite(comparison, parameter, value)
}

fn optional(comparison: &str, parameter: &str, value: Option<f64>, default: f64) -> Result<f64> {
    finite(comparison, parameter, value.unwrap_or(default))
}

fn missing_value(comparison: &str, params: &MeasureParams) -> Result<f64> {
    optional(comparison, "missing_value", params.missing_value, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct LengthRatio;

    impl SimilarityMeasure for LengthRatio {
        fn name(&self) -> &str {
            "length_ratio"
        }

        fn score(
            &self,
            left: &[&FieldValue],
            right: &[&FieldValue],
        ) -> std::result::Result<f64, MeasureError> {
            let len = |v: &FieldValue| v.as_text().map_or(0, |t| t.len()) as f64;
            let (a, b) = (len(left[0]), len(right[0]));
            Ok(if a.max(b) == 0.0 { 1.0 } else { a.min(b) / a.max(b) })
        }
    }

    #[test]
    fn builtins_resolve_with_parameters() {
        let catalog = MeasureCatalog::default();
        let params = MeasureParams {
            within_1y: Some(0.7),
            missing_value: Some(0.5),
            ..MeasureParams::default()
        };
        let measure = catalog.resolve("byear", "byear", &params).unwrap();
        assert_eq!(measure.name(), "byear");
        let score = measure
            .score(&[&FieldValue::from("1980")], &[&FieldValue::from("1979")])
            .unwrap();
        assert_eq!(score, 0.7);
    }

    #[test]
    fn configuration_errors_name_the_comparison() {
        let catalog = MeasureCatalog::default();

        let unknown = catalog.resolve("fname", "soundex", &MeasureParams::default());
        assert!(matches!(unknown, Err(LinkageError::UnknownMeasure { .. })));

        let missing = catalog.resolve("dob", "bmonthbday", &MeasureParams::default());
        match missing {
            Err(LinkageError::InvalidMeasureParameter { comparison, reason }) => {
                assert_eq!(comparison, "dob");
                assert!(reason.contains("swap_month_day"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let params = MeasureParams {
            scale: Some(0.0),
            ..MeasureParams::default()
        };
        assert!(catalog.resolve("age", "numeric", &params).is_err());
    }

    #[test]
    fn custom_measures_plug_in() {
        let mut catalog = MeasureCatalog::empty();
        catalog.register_measure(Arc::new(LengthRatio));
        assert!(catalog.contains("length_ratio"));

        let measure = catalog
            .resolve("name_len", "length_ratio", &MeasureParams::default())
            .unwrap();
        let score = measure
            .score(&[&FieldValue::from("ab")], &[&FieldValue::from("abcd")])
            .unwrap();
        assert_eq!(score, 0.5);
    }

    #[test]
    fn arity_mismatch_is_a_measure_error() {
        let measure = Measure::Exact { missing_value: 0.0 };
        let value = FieldValue::from("x");
        assert!(measure.score(&[&value, &value], &[&value]).is_err());
    }

    #[test]
    fn params_keep_unknown_keys() {
        let params: MeasureParams =
            serde_json::from_str(r#"{"missing_value": -1, "weight": 3}"#).unwrap();
        assert_eq!(params.missing_value, Some(-1.0));
        assert_eq!(params.extra.get("weight"), Some(&serde_json::json!(3)));
    }
}
