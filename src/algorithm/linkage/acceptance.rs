//! Tiered acceptance of scored pairs
//!
//! Every `(pass, tier)` has exactly one [`AcceptancePredicate`]. Predicates
//! come from the rule trees in the configuration or are registered directly
//! as closures. The engine itself holds no numeric cutoffs.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::algorithm::linkage::rules::RuleContext;
use crate::config::LinkageConfig;
use crate::error::{LinkageError, Result};
use crate::models::{SimilarityVector, Tier, TierSet};

/// Read-only view of a similarity vector with its comparison names
#[derive(Debug, Clone, Copy)]
pub struct ScoreView<'a> {
    names: &'a [String],
    scores: &'a SimilarityVector,
}

impl<'a> ScoreView<'a> {
    #[must_use]
    pub const fn new(names: &'a [String], scores: &'a SimilarityVector) -> Self {
        Self { names, scores }
    }

    /// Score of a named comparison
    #[must_use]
    pub fn get(&self, comparison: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|name| name == comparison)
            .and_then(|position| self.scores.get(position))
    }

    /// Score at a position of the vector
    #[must_use]
    pub fn at(&self, position: usize) -> Option<f64> {
        self.scores.get(position)
    }

    /// Score of a named comparison, NaN when the pass does not compare it
    ///
    /// Every ordering comparison against NaN is false, which makes this
    /// convenient inside closures.
    #[must_use]
    pub fn score(&self, comparison: &str) -> f64 {
        self.get(comparison).unwrap_or(f64::NAN)
    }

    #[must_use]
    pub const fn names(&self) -> &'a [String] {
        self.names
    }

    #[must_use]
    pub const fn scores(&self) -> &'a SimilarityVector {
        self.scores
    }
}

/// Decides whether a scored pair is accepted at one pass and tier
pub trait AcceptancePredicate: Send + Sync {
    fn evaluate(&self, scores: &ScoreView<'_>) -> bool;
}

impl<F> AcceptancePredicate for F
where
    F: Fn(&ScoreView<'_>) -> bool + Send + Sync,
{
    fn evaluate(&self, scores: &ScoreView<'_>) -> bool {
        self(scores)
    }
}

/// Predicates keyed by pass index and tier
#[derive(Clone, Default)]
pub struct AcceptanceRegistry {
    pass_count: usize,
    predicates: FxHashMap<(usize, Tier), Arc<dyn AcceptancePredicate>>,
}

impl fmt::Debug for AcceptanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.predicates.keys().copied().collect();
        keys.sort_unstable();
        f.debug_struct("AcceptanceRegistry")
            .field("pass_count", &self.pass_count)
            .field("predicates", &keys)
            .finish()
    }
}

impl AcceptanceRegistry {
    /// Empty registry for `pass_count` blocking passes
    #[must_use]
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            predicates: FxHashMap::default(),
        }
    }

    /// Compile the rule trees of `acceptance_by_pass`
    ///
    /// Tiers without a rule are left empty and reported by
    /// [`AcceptanceRegistry::validate`].
    ///
    /// # Errors
    ///
    /// [`LinkageError::InvalidRule`] naming the pass and tier of the first
    /// rule that does not compile.
    pub fn from_config(config: &LinkageConfig) -> Result<Self> {
        let mut registry = Self::new(config.acceptance_by_pass.len());

        for (pass, rules) in config.acceptance_by_pass.iter().enumerate() {
            let comparisons = config
                .comp_names_by_pass
                .get(pass)
                .map_or(&[][..], Vec::as_slice);
            let context = RuleContext::new(comparisons, &config.thresholds, &config.masks);

            for tier in Tier::ALL {
                let Some(rule) = rules.get(tier) else {
                    continue;
                };
                let compiled = rule.compile(&context).map_err(|reason| {
                    LinkageError::InvalidRule {
                        pass,
                        tier,
                        reason,
                    }
                })?;
                registry.register(pass, tier, compiled);
            }
        }

        Ok(registry)
    }

    #[must_use]
    pub const fn pass_count(&self) -> usize {
        self.pass_count
    }

    /// Register or replace the predicate of one pass and tier
    pub fn register<P>(&mut self, pass: usize, tier: Tier, predicate: P) -> &mut Self
    where
        P: AcceptancePredicate + 'static,
    {
        self.predicates.insert((pass, tier), Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn contains(&self, pass: usize, tier: Tier) -> bool {
        self.predicates.contains_key(&(pass, tier))
    }

    /// Check the registry covers exactly `expected_passes` passes
    ///
    /// # Errors
    ///
    /// [`LinkageError::PassCountMismatch`] when the pass counts disagree,
    /// [`LinkageError::MissingPredicate`] for the first uncovered pass/tier.
    pub fn validate(&self, expected_passes: usize) -> Result<()> {
        if self.pass_count != expected_passes {
            return Err(LinkageError::PassCountMismatch {
                structure: "acceptance_by_pass",
                expected: expected_passes,
                found: self.pass_count,
            });
        }
        if let Some(&(pass, tier)) = self
            .predicates
            .keys()
            .filter(|(pass, _)| *pass >= self.pass_count)
            .min()
        {
            return Err(LinkageError::ConfigValidation(format!(
                "acceptance predicate registered for pass {pass}, tier {tier} but only {} passes exist",
                self.pass_count
            )));
        }
        for pass in 0..self.pass_count {
            for tier in Tier::ALL {
                if !self.contains(pass, tier) {
                    return Err(LinkageError::MissingPredicate { pass, tier });
                }
            }
        }
        Ok(())
    }

    /// Evaluate the predicate of one pass and tier
    pub fn accept(&self, pass: usize, tier: Tier, scores: &ScoreView<'_>) -> Result<bool> {
        self.predicates
            .get(&(pass, tier))
            .map(|predicate| predicate.evaluate(scores))
            .ok_or(LinkageError::MissingPredicate { pass, tier })
    }

    /// Evaluate every tier independently, strictest first
    pub fn evaluate_tiers(&self, pass: usize, scores: &ScoreView<'_>) -> Result<TierSet> {
        let mut tiers = TierSet::empty();
        for tier in Tier::ALL {
            if self.accept(pass, tier, scores)? {
                tiers.insert(tier);
            }
        }
        Ok(tiers)
    }
}
