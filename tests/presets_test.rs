//! The standard five-pass strategy on a small person dataset

use record_linkage::algorithm::linkage::presets::STANDARD_FIELDS;
use record_linkage::algorithm::linkage::{LinkageResult, Linker};
use record_linkage::models::{PassId, RecordTable, Tier};
use record_linkage::standard_config;

// common_id fname mname lname altlname minitial xf xl byear bmonth bday zipcode county
type Person = [&'static str; 13];

const LEFT: [(&str, Person); 4] = [
    ("L1", ["A100", "ole", "", "hansen", "", "", "O400", "H525", "1960", "1", "2", "1000", "k1"]),
    ("L2", ["", "berg", "", "anna", "", "", "B620", "A500", "1970", "3", "4", "2000", "k2"]),
    ("L3", ["", "katherine", "", "larsen", "", "", "K365", "L625", "1985", "7", "8", "3000", "k3"]),
    ("L4", ["Z9", "zed", "", "quist", "", "", "Z300", "Q230", "1999", "9", "9", "5000", "k5"]),
];

const RIGHT: [(&str, Person); 4] = [
    ("R1", ["A100", "ole", "", "hansen", "", "", "O400", "H525", "1960", "1", "2", "1000", "k1"]),
    ("R2", ["", "anna", "", "berg", "", "", "A500", "B620", "1970", "3", "4", "2000", "k2"]),
    ("R3", ["", "catherine", "", "larson", "", "", "C365", "L625X", "1985", "7", "8", "4000", "k4"]),
    ("R4", ["Z8", "yvonne", "", "ek", "", "", "Y150", "E200", "2001", "1", "1", "6000", "k6"]),
];

fn table(name: &str, people: &[(&str, Person)]) -> RecordTable {
    people
        .iter()
        .fold(RecordTable::builder(name, STANDARD_FIELDS), |builder, (id, values)| {
            builder.record(*id, *values)
        })
        .build()
        .unwrap()
}

fn run() -> LinkageResult {
    let (left, right) = (table("left", &LEFT), table("right", &RIGHT));
    Linker::new(standard_config()).run(&left, Some(&right)).unwrap()
}

fn pass_of(result: &LinkageResult, left: &str, right: &str) -> Option<PassId> {
    result
        .accepted
        .iter()
        .find(|pair| pair.left_id == left && pair.right_id == right)
        .map(|pair| pair.pass)
}

#[test]
fn test_identical_records_match_in_first_pass() {
    let result = run();
    assert_eq!(result.summaries[0].candidates, 1);
    assert_eq!(pass_of(&result, "L1", "R1"), Some(PassId::Blocking(0)));
    assert!(result.results.contains(Tier::Strict, "L1", "R1"));
}

#[test]
fn test_swapped_names_found_by_inverted_pass() {
    let result = run();
    assert_eq!(result.summaries[2].candidates, 0);
    assert_eq!(result.summaries[3].candidates, 1);
    assert_eq!(pass_of(&result, "L2", "R2"), Some(PassId::Blocking(3)));

    // No common id and no middle name evidence: strong, but not strict.
    assert!(!result.results.contains(Tier::Strict, "L2", "R2"));
    assert!(result.results.contains(Tier::Moderate, "L2", "R2"));
}

#[test]
fn test_close_names_found_by_birth_date_pass() {
    let result = run();
    assert_eq!(result.summaries[4].candidates, 1);
    assert_eq!(pass_of(&result, "L3", "R3"), Some(PassId::Blocking(4)));

    assert!(!result.results.contains(Tier::Moderate, "L3", "R3"));
    assert!(result.results.contains(Tier::Relaxed, "L3", "R3"));
    assert!(result.results.contains(Tier::Review, "L3", "R3"));
}

#[test]
fn test_unrelated_records_stay_unmatched() {
    let result = run();
    assert_eq!(result.summaries[1].candidates, 0);
    assert_eq!(result.accepted.len(), 3);
    let review = result.results.matches(Tier::Review);
    assert!(review.iter().all(|pair| pair.left_id != "L4" && pair.right_id != "R4"));
}

#[test]
fn test_heavier_pairs_come_from_earlier_passes() {
    let result = run();
    let weight = |left: &str| {
        result
            .accepted
            .iter()
            .find(|pair| pair.left_id == left)
            .map(|pair| result.weight(pair))
            .unwrap()
    };
    assert!(weight("L1") > weight("L2"));
    assert!(weight("L2") > weight("L3"));
}
