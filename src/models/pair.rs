//! Candidate, scored and accepted pairs

use std::fmt;

use serde::Serialize;

use crate::models::types::{PassId, Tier, TierSet};

/// Pair of record rows proposed by blocking within one pass
///
/// Rows index into the left and right tables. In deduplication mode
/// `left < right` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidatePair {
    pub left: usize,
    pub right: usize,
    pub pass: PassId,
}

impl CandidatePair {
    #[must_use]
    pub const fn new(left: usize, right: usize, pass: PassId) -> Self {
        Self { left, right, pass }
    }

    #[must_use]
    pub const fn rows(&self) -> (usize, usize) {
        (self.left, self.right)
    }
}

/// Ordered similarity scores, one per comparison of the pass
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct SimilarityVector(Vec<f64>);

impl SimilarityVector {
    #[must_use]
    pub const fn new(scores: Vec<f64>) -> Self {
        Self(scores)
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<f64> {
        self.0.get(position).copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all finite scores
    #[must_use]
    pub fn aggregate(&self) -> f64 {
        self.0.iter().copied().filter(|score| score.is_finite()).sum()
    }
}

impl From<Vec<f64>> for SimilarityVector {
    fn from(scores: Vec<f64>) -> Self {
        Self(scores)
    }
}

/// Candidate pair together with its similarity vector
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPair {
    pub pair: CandidatePair,
    pub scores: SimilarityVector,
}

/// A pair accepted at one or more tiers in some pass
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedPair {
    pub left_id: String,
    pub right_id: String,
    pub left_row: usize,
    pub right_row: usize,
    pub pass: PassId,
    pub tiers: TierSet,
    pub scores: SimilarityVector,
}

impl AcceptedPair {
    #[must_use]
    pub const fn accepted_at(&self, tier: Tier) -> bool {
        self.tiers.contains(tier)
    }

    /// Strictest accepting tier
    #[must_use]
    pub fn strongest_tier(&self) -> Option<Tier> {
        self.tiers.strongest()
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.scores.aggregate()
    }

    /// Rank key combining pass order and aggregate score
    ///
    /// A blocking pass `p` out of `pass_count` weighs `10^(pass_count - p)`
    /// plus its aggregate score, so earlier passes always outrank later ones.
    /// Ground-truth pairs weigh `10^(pass_count + 1)`.
    #[must_use]
    pub fn weight(&self, pass_count: usize) -> f64 {
        let exponent = |value: usize| i32::try_from(value).unwrap_or(i32::MAX);
        match self.pass {
            PassId::GroundTruth(_) => 10f64.powi(exponent(pass_count + 1)),
            PassId::Blocking(pass) => {
                10f64.powi(exponent(pass_count.saturating_sub(pass))) + self.score()
            }
        }
    }
}

impl fmt::Display for AcceptedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) in pass {}", self.left_id, self.right_id, self.pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(pass: PassId, scores: Vec<f64>) -> AcceptedPair {
        AcceptedPair {
            left_id: "a".to_string(),
            right_id: "b".to_string(),
            left_row: 0,
            right_row: 1,
            pass,
            tiers: [Tier::Relaxed].into_iter().collect(),
            scores: scores.into(),
        }
    }

    #[test]
    fn aggregate_ignores_non_finite_scores() {
        let scores = SimilarityVector::new(vec![0.5, f64::NAN, -1.0, 1.0]);
        assert!((scores.aggregate() - 0.5).abs() < 1e-12);
        assert_eq!(scores.get(3), Some(1.0));
        assert_eq!(scores.get(4), None);
    }

    #[test]
    fn earlier_passes_weigh_more() {
        let first = accepted(PassId::Blocking(0), vec![0.1]);
        let second = accepted(PassId::Blocking(1), vec![1.0, 1.0, 1.0]);
        let ground_truth = accepted(PassId::GroundTruth(0), vec![]);

        assert!(first.weight(3) > second.weight(3));
        assert!(ground_truth.weight(3) > first.weight(3));
        assert!((first.weight(3) - 1000.1).abs() < 1e-9);
        assert_eq!(first.strongest_tier(), Some(Tier::Relaxed));
    }
}
