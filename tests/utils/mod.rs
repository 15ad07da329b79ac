//! Shared fixtures for the integration tests
#![allow(dead_code)]

use record_linkage::algorithm::linkage::Rule;
use record_linkage::config::{ComparisonConfig, LinkageConfig, PassRules};
use record_linkage::models::{AcceptedPair, PassId, RecordTable, SimilarityVector, TierSet};

/// Left table of the two-table ssn scenario
#[must_use]
pub fn ssn_left() -> RecordTable {
    RecordTable::builder("a", &["dob", "ssn"])
        .record("1", ["1990-01-01", "123"])
        .record("2", ["1985-05-05", "456"])
        .build()
        .unwrap()
}

/// Right table of the two-table ssn scenario
#[must_use]
pub fn ssn_right() -> RecordTable {
    RecordTable::builder("b", &["dob", "ssn"])
        .record("9", ["1990-01-01", "123"])
        .build()
        .unwrap()
}

/// Rule accepting pairs whose listed scores are all exactly 1
#[must_use]
pub fn all_exact(scores: &[&str]) -> Rule {
    Rule::all(scores.iter().map(|score| Rule::equals(*score, 1.0)).collect())
}

/// Single ssn pass accepting exact ssn and dob at every tier
#[must_use]
pub fn ssn_config() -> LinkageConfig {
    LinkageConfig::builder()
        .comparison("ssn_exact", ComparisonConfig::new("exact").with_fields(&["ssn"]))
        .comparison("dob_exact", ComparisonConfig::new("exact").with_fields(&["dob"]))
        .pass(
            &["ssn"],
            &["ssn_exact", "dob_exact"],
            PassRules::uniform(&all_exact(&["ssn_exact", "dob_exact"])),
        )
        .build()
        .unwrap()
}

/// Small person table with duplicates under varying spellings
#[must_use]
pub fn people() -> RecordTable {
    RecordTable::builder("people", &["fname", "lname", "byear", "zip"])
        .record("p1", ["john", "smith", "1980", "1000"])
        .record("p2", ["jon", "smith", "1980", "1000"])
        .record("p3", ["john", "smyth", "1981", "1000"])
        .record("p4", ["mary", "jones", "1975", "2000"])
        .record("p5", ["marie", "jones", "1975", "2000"])
        .record("p6", ["peter", "olsen", "1990", ""])
        .build()
        .unwrap()
}

/// Accepted pair with a single score, for resolution tests
#[must_use]
pub fn accepted(left: &str, right: &str, pass: usize, tiers: TierSet, score: f64) -> AcceptedPair {
    AcceptedPair {
        left_id: left.to_string(),
        right_id: right.to_string(),
        left_row: 0,
        right_row: 0,
        pass: PassId::Blocking(pass),
        tiers,
        scores: SimilarityVector::new(vec![score]),
    }
}
