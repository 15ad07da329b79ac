//! Multi-pass deterministic record linkage
//!
//! A run is a sequence of blocking passes. Every pass:
//!
//! 1. Generates candidate pairs from the records not yet excluded
//! 2. Scores each candidate with the comparisons of the pass
//! 3. Evaluates the acceptance predicate of every tier
//! 4. Excludes the records of confidently accepted pairs from later passes
//!
//! The accepted pairs of all passes are then resolved into one result set
//! per tier under the configured cardinality.

pub mod acceptance;
pub mod blocking;
pub mod comparison;
pub mod exclusion;
pub mod linker;
pub mod presets;
pub mod resolution;
pub mod rules;

pub use acceptance::{AcceptancePredicate, AcceptanceRegistry, ScoreView};
pub use blocking::{BlockingKey, block};
pub use comparison::{ResolvedComparison, compare, score_pair};
pub use exclusion::{ExclusionSet, SeenPairs};
pub use linker::{LinkagePlan, LinkageResult, Linker, PassState, PassSummary, PlannedPass};
pub use presets::standard_config;
pub use resolution::{
    Cardinality, ConflictPolicy, MatchResultSet, MatchedPair, RankOrder, SupersedeReason,
    SupersededPair, TieBreak, TierPartition, resolve, resolve_dedup,
};
pub use rules::{Bound, CompareOp, CompiledRule, Rule, RuleContext, ScoreCondition};
