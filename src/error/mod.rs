//! Error handling for the linkage engine.

use std::io;
use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

use crate::models::{PassId, Tier};

/// Specialized error type for linkage runs
///
/// Configuration errors are raised while a run is being planned, before any
/// pair is processed. Measure failures abort the run in progress.
#[derive(Debug, thiserror::Error)]
pub enum LinkageError {
    /// Error opening or reading a file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error opening a specific file
    #[error("Failed to access {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed JSON configuration or summary
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reading or writing delimited files
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error processing Parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Error processing Arrow data
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Structural problem in the configuration
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// The per-pass structures disagree on the number of passes
    #[error("{structure} defines {found} passes but {expected} were expected")]
    PassCountMismatch {
        structure: &'static str,
        expected: usize,
        found: usize,
    },

    /// A pass refers to a comparison that is not defined
    #[error("Pass {pass} refers to unknown comparison '{name}'")]
    UnknownComparison { pass: usize, name: String },

    /// A comparison refers to a measure that is not registered
    #[error("Comparison '{comparison}' uses unknown measure '{measure}'")]
    UnknownMeasure { comparison: String, measure: String },

    /// A measure parameter is out of range or the wrong shape
    #[error("Comparison '{comparison}' has an invalid parameter: {reason}")]
    InvalidMeasureParameter { comparison: String, reason: String },

    /// A configured field does not exist in an input table
    #[error("{context} refers to field '{field}' missing from table '{table}'")]
    UnknownField {
        context: String,
        table: String,
        field: String,
    },

    /// No acceptance predicate registered for a pass and tier
    #[error("No acceptance predicate for pass {pass}, tier {tier}")]
    MissingPredicate { pass: usize, tier: Tier },

    /// An acceptance rule cannot be compiled
    #[error("Invalid acceptance rule for pass {pass}, tier {tier}: {reason}")]
    InvalidRule {
        pass: usize,
        tier: Tier,
        reason: String,
    },

    /// Two records in one table share an identifier
    #[error("Duplicate record id '{id}' in table '{table}'")]
    DuplicateRecordId { table: String, id: String },

    /// A similarity measure failed on a candidate pair
    #[error(
        "Pass {pass}: comparison '{comparison}' failed for ({left_id}, {right_id}): {reason}"
    )]
    MeasureFailure {
        pass: PassId,
        comparison: String,
        left_id: String,
        right_id: String,
        reason: String,
    },

    /// Input table does not match the declared schema
    #[error("Schema error: {0}")]
    Schema(String),
}

impl LinkageError {
    /// Wrap an IO error together with the path that caused it
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Whether the error was detected while planning a run
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigValidation(_)
                | Self::PassCountMismatch { .. }
                | Self::UnknownComparison { .. }
                | Self::UnknownMeasure { .. }
                | Self::InvalidMeasureParameter { .. }
                | Self::UnknownField { .. }
                | Self::MissingPredicate { .. }
                | Self::InvalidRule { .. }
        )
    }
}

/// Result type for linkage operations
pub type Result<T> = std::result::Result<T, LinkageError>;
