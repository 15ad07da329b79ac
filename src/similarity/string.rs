//! String similarity measures

use crate::models::FieldValue;

/// Jaro-Winkler similarity of two texts
#[must_use]
pub fn jaro_winkler(left: &str, right: &str) -> f64 {
    strsim::jaro_winkler(left, right)
}

/// Levenshtein similarity normalized by the longer text
#[must_use]
pub fn levenshtein(left: &str, right: &str) -> f64 {
    strsim::normalized_levenshtein(left, right)
}

/// 1 for identical texts, 0 otherwise
#[must_use]
pub fn exact(left: &str, right: &str) -> f64 {
    if left == right { 1.0 } else { 0.0 }
}

/// Score a pair of single values with a text function
///
/// A missing value on either side yields `missing_value`.
pub fn compare_text(
    left: &FieldValue,
    right: &FieldValue,
    missing_value: f64,
    function: fn(&str, &str) -> f64,
) -> f64 {
    match (left.as_text(), right.as_text()) {
        (Some(left), Some(right)) => function(&left, &right),
        _ => missing_value,
    }
}

/// Middle initial agreement
///
/// Both sides supply `[initial, middle name]`. Matching initials score 1
/// when at least one middle name is a single letter, since the initial is
/// then the whole recorded middle name. Otherwise matching initials score
/// `unclear`. A missing initial on either side scores `missing_value`.
pub fn middle_initial(
    left: [&FieldValue; 2],
    right: [&FieldValue; 2],
    unclear: f64,
    missing_value: f64,
) -> f64 {
    let [left_initial, left_name] = left;
    let [right_initial, right_name] = right;

    let (Some(left_initial), Some(right_initial)) = (left_initial.as_text(), right_initial.as_text())
    else {
        return missing_value;
    };
    if left_initial != right_initial {
        return 0.0;
    }

    let single_letter =
        |value: &FieldValue| value.as_text().is_some_and(|name| name.chars().count() == 1);
    if single_letter(left_name) || single_letter(right_name) {
        1.0
    } else {
        unclear
    }
}
