//! Deterministic multi-pass record linkage.
//!
//! Records of one table (deduplication) or two tables (linkage) are paired by
//! a sequence of blocking passes. Each pass scores its candidates with named
//! similarity measures and accepts them at four confidence tiers through
//! rule-based predicates. Records confidently matched in a pass are excluded
//! from later passes, and the accepted pairs are finally resolved into one
//! result set per tier under a cardinality constraint.
//!
//! ```no_run
//! use record_linkage::{Linker, RecordTable, standard_config};
//!
//! # fn main() -> record_linkage::Result<()> {
//! let table: RecordTable = record_linkage::reader::load_table(&serde_json::from_str(
//!     r#"{"name": "people", "path": "people.csv", "id_field": "id"}"#,
//! )?)?;
//! let result = Linker::new(standard_config()).run(&table, None)?;
//! println!("{} pairs accepted", result.accepted.len());
//! # Ok(())
//! # }
//! ```

pub mod algorithm;
pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod reader;
pub mod similarity;
pub mod utils;

// Re-export the most common types for easier use
pub use algorithm::linkage::{
    AcceptancePredicate, AcceptanceRegistry, Cardinality, ConflictPolicy, LinkagePlan,
    LinkageResult, Linker, MatchResultSet, MatchedPair, PassSummary, Rule, ScoreView,
    standard_config,
};
pub use config::{ComparisonConfig, LinkageConfig, PassRules, RunConfig, TableSource};
pub use error::{LinkageError, Result};
pub use models::{
    AcceptedPair, CandidatePair, FieldValue, PassId, Record, RecordTable, Side, Tier, TierSet,
};
pub use similarity::{Measure, MeasureCatalog, MeasureParams, SimilarityMeasure};
