//! Domain models for record linkage
//!
//! This module contains the records being linked, the pairs produced while
//! linking them, and the small enums (tiers, sides, pass ids) shared by
//! every stage of the engine.

pub mod pair;
pub mod record;
pub mod types;

// Re-export commonly used types
pub use pair::{AcceptedPair, CandidatePair, ScoredPair, SimilarityVector};
pub use record::{FieldValue, Record, RecordTable, RecordTableBuilder, Schema, TablePair};
pub use types::{PassId, Side, Tier, TierSet};
