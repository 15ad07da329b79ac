//! Pass orchestration
//!
//! The [`Linker`] runs ground-truth pre-passes and then every blocking pass
//! in order. Each pass blocks against the current exclusion set, scores the
//! candidates, evaluates every tier, and only then commits its accepted
//! pairs and exclusions to the [`PassState`]. After the last pass the
//! accumulated pairs are resolved into the final [`MatchResultSet`].

use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

use crate::algorithm::linkage::acceptance::{AcceptanceRegistry, ScoreView};
use crate::algorithm::linkage::blocking::{BlockingKey, block};
use crate::algorithm::linkage::comparison::{ResolvedComparison, compare};
use crate::algorithm::linkage::exclusion::{ExclusionSet, SeenPairs};
use crate::algorithm::linkage::resolution::{MatchResultSet, resolve, resolve_dedup};
use crate::config::LinkageConfig;
use crate::error::{LinkageError, Result};
use crate::models::{
    AcceptedPair, CandidatePair, PassId, RecordTable, ScoredPair, Side, TablePair, Tier, TierSet,
};
use crate::similarity::MeasureCatalog;
use crate::utils::logging::{create_pass_progress_bar, create_spinner, finish_progress_bar, log_pass_summary};

/// Counts recorded for one finished pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub pass: PassId,
    pub label: String,
    pub blocking: Vec<String>,
    pub candidates: usize,
    /// Pairs accepted at one or more tiers
    pub accepted: usize,
    pub strict: usize,
    pub moderate: usize,
    pub relaxed: usize,
    pub review: usize,
    pub newly_excluded: usize,
    pub elapsed_secs: f64,
}

impl PassSummary {
    #[must_use]
    pub const fn count(&self, tier: Tier) -> usize {
        match tier {
            Tier::Strict => self.strict,
            Tier::Moderate => self.moderate,
            Tier::Relaxed => self.relaxed,
            Tier::Review => self.review,
        }
    }
}

/// One pass of a plan, with every name resolved
#[derive(Debug, Clone)]
pub struct PlannedPass {
    pub id: PassId,
    pub label: String,
    pub key: BlockingKey,
    pub comparisons: Vec<ResolvedComparison>,
    pub comparison_names: Vec<String>,
}

/// A validated run over a fixed pair of tables
///
/// Building the plan performs every configuration check, so a plan that
/// builds can only fail on per-pair measure errors.
#[derive(Debug)]
pub struct LinkagePlan<'a> {
    tables: TablePair<'a>,
    passes: Vec<PlannedPass>,
    registry: AcceptanceRegistry,
    blocking_passes: usize,
}

impl<'a> LinkagePlan<'a> {
    /// Validate the configuration and resolve it against the tables
    ///
    /// # Arguments
    ///
    /// * `config` - Matching strategy
    /// * `catalog` - Measures available to comparisons
    /// * `registry` - Acceptance predicates; compiled from the config when `None`
    /// * `tables` - Tables being linked
    pub fn build(
        config: &LinkageConfig,
        catalog: &MeasureCatalog,
        registry: Option<&AcceptanceRegistry>,
        tables: TablePair<'a>,
    ) -> Result<Self> {
        config.validate()?;
        let blocking_passes = config.pass_count();

        let registry = match registry {
            Some(registry) => registry.clone(),
            None => AcceptanceRegistry::from_config(config)?,
        };
        registry.validate(blocking_passes)?;

        let mut passes = Vec::with_capacity(config.ground_truth_ids.len() + blocking_passes);

        for (index, field) in config.ground_truth_ids.iter().enumerate() {
            let fields = [field.clone()];
            passes.push(PlannedPass {
                id: PassId::GroundTruth(index),
                label: format!("dup_{field}"),
                key: BlockingKey::resolve(&fields, tables, &format!("ground-truth id '{field}'"))?,
                comparisons: Vec::new(),
                comparison_names: Vec::new(),
            });
        }

        for (index, fields) in config.blocks_by_pass.iter().enumerate() {
            let key = BlockingKey::resolve(fields, tables, &format!("blocking pass {index}"))?;
            let names = &config.comp_names_by_pass[index];
            let comparisons = names
                .iter()
                .map(|name| {
                    let comparison = config.comparisons.get(name).ok_or_else(|| {
                        LinkageError::UnknownComparison {
                            pass: index,
                            name: name.clone(),
                        }
                    })?;
                    ResolvedComparison::resolve(name, comparison, catalog, tables)
                })
                .collect::<Result<Vec<_>>>()?;

            let label = if fields.is_empty() {
                "all records".to_string()
            } else {
                fields.join("+")
            };
            passes.push(PlannedPass {
                id: PassId::Blocking(index),
                label,
                key,
                comparisons,
                comparison_names: names.clone(),
            });
        }

        Ok(Self {
            tables,
            passes,
            registry,
            blocking_passes,
        })
    }

    #[must_use]
    pub fn passes(&self) -> &[PlannedPass] {
        &self.passes
    }

    /// Number of blocking passes, ground-truth passes not included
    #[must_use]
    pub const fn blocking_passes(&self) -> usize {
        self.blocking_passes
    }

    #[must_use]
    pub const fn tables(&self) -> TablePair<'a> {
        self.tables
    }

    /// Accepting tiers of a scored pair
    fn evaluate(&self, pass: &PlannedPass, scored: &ScoredPair) -> Result<TierSet> {
        match pass.id {
            PassId::GroundTruth(_) => Ok(TierSet::all()),
            PassId::Blocking(index) => self.registry.evaluate_tiers(
                index,
                &ScoreView::new(&pass.comparison_names, &scored.scores),
            ),
        }
    }
}

/// Mutable state carried from one pass to the next
#[derive(Debug, Clone)]
pub struct PassState {
    /// Index of the next pass to run
    pub pass: usize,
    pub exclusions: ExclusionSet,
    pub accepted: Vec<AcceptedPair>,
    pub summaries: Vec<PassSummary>,
    seen: SeenPairs,
}

impl PassState {
    #[must_use]
    pub fn new(dedup: bool) -> Self {
        Self {
            pass: 0,
            exclusions: ExclusionSet::new(dedup),
            accepted: Vec::new(),
            summaries: Vec::new(),
            seen: SeenPairs::default(),
        }
    }

    /// Apply the results of a finished pass
    ///
    /// Records of every pair accepted at `exclude_on` or a stricter tier are
    /// excluded from later passes.
    fn commit(
        &mut self,
        mut summary: PassSummary,
        accepted: Vec<AcceptedPair>,
        candidates: &[CandidatePair],
        exclude_on: Tier,
        remember_candidates: bool,
    ) {
        let mut newly_excluded = 0;
        for pair in &accepted {
            if pair.tiers.reaches(exclude_on) {
                newly_excluded += usize::from(self.exclusions.insert(Side::Left, pair.left_row));
                newly_excluded += usize::from(self.exclusions.insert(Side::Right, pair.right_row));
            }
        }
        if remember_candidates {
            self.seen.extend(candidates);
        }

        summary.newly_excluded = newly_excluded;
        log_pass_summary(&summary);
        self.summaries.push(summary);
        self.accepted.extend(accepted);
        self.pass += 1;
    }
}

/// Output of a linkage run
#[derive(Debug, Clone)]
pub struct LinkageResult {
    /// Pairs accepted in any pass, in pass order
    pub accepted: Vec<AcceptedPair>,
    /// Resolved per-tier result sets
    pub results: MatchResultSet,
    pub summaries: Vec<PassSummary>,
    /// Number of blocking passes
    pub pass_count: usize,
    pub dedup: bool,
    pub elapsed: Duration,
}

impl LinkageResult {
    /// Rank weight of an accepted pair in this run
    #[must_use]
    pub fn weight(&self, pair: &AcceptedPair) -> f64 {
        pair.weight(self.pass_count)
    }

    /// Total number of candidate pairs scored
    #[must_use]
    pub fn candidates(&self) -> usize {
        self.summaries.iter().map(|summary| summary.candidates).sum()
    }
}

/// Orchestrates a multi-pass linkage run
#[derive(Debug, Clone)]
pub struct Linker {
    config: LinkageConfig,
    catalog: MeasureCatalog,
    registry: Option<AcceptanceRegistry>,
}

impl Linker {
    /// Create a linker using the built-in measures and the configured rules
    #[must_use]
    pub fn new(config: LinkageConfig) -> Self {
        Self {
            config,
            catalog: MeasureCatalog::default(),
            registry: None,
        }
    }

    /// Use a different measure catalog
    #[must_use]
    pub fn with_catalog(mut self, catalog: MeasureCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Use explicitly registered predicates instead of the configured rules
    #[must_use]
    pub fn with_registry(mut self, registry: AcceptanceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &LinkageConfig {
        &self.config
    }

    /// Validate and resolve the configuration against the tables
    ///
    /// # Arguments
    ///
    /// * `left` - Left table, or the only table when deduplicating
    /// * `right` - Right table; `None` deduplicates `left`
    pub fn plan<'a>(&self, left: &'a RecordTable, right: Option<&'a RecordTable>) -> Result<LinkagePlan<'a>> {
        let tables = right.map_or_else(|| TablePair::dedup(left), |right| TablePair::link(left, right));
        LinkagePlan::build(&self.config, &self.catalog, self.registry.as_ref(), tables)
    }

    /// Run every pass and resolve the accepted pairs
    ///
    /// # Arguments
    ///
    /// * `left` - Left table, or the only table when deduplicating
    /// * `right` - Right table; `None` deduplicates `left`
    ///
    /// # Returns
    ///
    /// The accepted pairs, the per-tier result sets and per-pass summaries
    pub fn run(&self, left: &RecordTable, right: Option<&RecordTable>) -> Result<LinkageResult> {
        let start_time = Instant::now();
        let plan = self.plan(left, right)?;

        let threads = self.config.parallel.num_threads.unwrap_or_else(num_cpus::get);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| LinkageError::ConfigValidation(format!("cannot start {threads} worker threads: {e}")))?;

        let tables = plan.tables();
        if tables.dedup {
            info!(
                "Deduplicating {} records of '{}' over {} passes using {threads} threads",
                tables.left.len(),
                tables.left.name(),
                plan.passes().len()
            );
        } else {
            info!(
                "Linking {} records of '{}' with {} records of '{}' over {} passes using {threads} threads",
                tables.left.len(),
                tables.left.name(),
                tables.right.len(),
                tables.right.name(),
                plan.passes().len()
            );
        }

        let state = pool.install(|| self.execute(&plan))?;
        let spinner = create_spinner(
            &format!("Resolving {} accepted pairs", state.accepted.len()),
            self.config.show_progress,
        );
        let resolver = if tables.dedup { resolve_dedup } else { resolve };
        let results = resolver(
            &state.accepted,
            self.config.cardinality,
            &self.config.conflict_policy,
        );
        finish_progress_bar(&spinner, None);

        let elapsed = start_time.elapsed();
        info!(
            "Linkage complete: {} accepted pairs, {} strict / {} moderate / {} relaxed / {} review matches after {} resolution in {:.2?}",
            state.accepted.len(),
            results.matches(Tier::Strict).len(),
            results.matches(Tier::Moderate).len(),
            results.matches(Tier::Relaxed).len(),
            results.matches(Tier::Review).len(),
            self.config.cardinality,
            elapsed
        );

        Ok(LinkageResult {
            accepted: state.accepted,
            results,
            summaries: state.summaries,
            pass_count: plan.blocking_passes(),
            dedup: tables.dedup,
            elapsed,
        })
    }

    fn execute(&self, plan: &LinkagePlan<'_>) -> Result<PassState> {
        let tables = plan.tables();
        let mut state = PassState::new(tables.dedup);

        for pass in plan.passes() {
            let pass_start = Instant::now();
            let seen = self.config.skip_seen_pairs.then_some(&state.seen);
            let candidates = block(tables, &pass.key, &state.exclusions, pass.id, seen);

            let progress = create_pass_progress_bar(
                candidates.len() as u64,
                &format!("pass {} ({})", pass.id, pass.label),
                self.config.show_progress,
            );
            let scored = compare(
                tables,
                &candidates,
                &pass.comparisons,
                &self.config.parallel,
                &progress,
            )?;
            finish_progress_bar(&progress, None);

            let mut summary = PassSummary {
                pass: pass.id,
                label: pass.label.clone(),
                blocking: pass.key.names().to_vec(),
                candidates: candidates.len(),
                accepted: 0,
                strict: 0,
                moderate: 0,
                relaxed: 0,
                review: 0,
                newly_excluded: 0,
                elapsed_secs: 0.0,
            };

            let mut accepted = Vec::new();
            for scored in scored {
                let tiers = plan.evaluate(pass, &scored)?;
                if tiers.is_empty() {
                    continue;
                }
                summary.strict += usize::from(tiers.contains(Tier::Strict));
                summary.moderate += usize::from(tiers.contains(Tier::Moderate));
                summary.relaxed += usize::from(tiers.contains(Tier::Relaxed));
                summary.review += usize::from(tiers.contains(Tier::Review));

                let ScoredPair { pair, scores } = scored;
                accepted.push(AcceptedPair {
                    left_id: tables.left.record(pair.left).id().to_string(),
                    right_id: tables.right.record(pair.right).id().to_string(),
                    left_row: pair.left,
                    right_row: pair.right,
                    pass: pair.pass,
                    tiers,
                    scores,
                });
            }
            summary.accepted = accepted.len();
            summary.elapsed_secs = pass_start.elapsed().as_secs_f64();
            debug!("Pass {} evaluated in {:.2?}", pass.id, pass_start.elapsed());

            state.commit(
                summary,
                accepted,
                &candidates,
                self.config.exclude_on,
                self.config.skip_seen_pairs,
            );
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::linkage::rules::Rule;
    use crate::config::{ComparisonConfig, PassRules};

    fn ssn_table() -> RecordTable {
        RecordTable::builder("people", &["ssn", "fname"])
            .record("p1", ["1", "ann"])
            .record("p2", ["1", "ann"])
            .record("p3", ["2", "bob"])
            .record("p4", ["", "bob"])
            .build()
            .unwrap()
    }

    #[test]
    fn dedup_run_excludes_matched_records() {
        let config = LinkageConfig::builder()
            .comparison("fname", ComparisonConfig::new("exact"))
            .pass(&["ssn"], &["fname"], PassRules::uniform(&Rule::equals("fname", 1.0)))
            .pass(&[], &["fname"], PassRules::uniform(&Rule::equals("fname", 1.0)))
            .build()
            .unwrap();
        let result = Linker::new(config).run(&ssn_table(), None).unwrap();

        assert_eq!(result.summaries.len(), 2);
        assert_eq!(result.summaries[0].candidates, 1);
        assert_eq!(result.summaries[0].newly_excluded, 2);
        // p1 and p2 are excluded, leaving only (p3, p4).
        assert_eq!(result.summaries[1].candidates, 1);
        assert_eq!(result.accepted.len(), 2);
        assert!(result.results.contains(Tier::Strict, "p3", "p4"));
    }

    #[test]
    fn ground_truth_pass_runs_first() {
        let config = LinkageConfig::builder()
            .ground_truth_id("ssn")
            .pass(&[], &[], PassRules::uniform(&Rule::Never))
            .build()
            .unwrap();
        let result = Linker::new(config).run(&ssn_table(), None).unwrap();

        assert_eq!(result.summaries[0].pass, PassId::GroundTruth(0));
        assert_eq!(result.summaries[0].label, "dup_ssn");
        assert_eq!(result.accepted.len(), 1);
        assert!(result.accepted[0].tiers == TierSet::all());
        // Only p3 and p4 remain for the blocking pass.
        assert_eq!(result.summaries[1].candidates, 1);
    }

    #[test]
    fn registry_replaces_configured_rules() {
        let config = LinkageConfig::builder()
            .comparison("fname", ComparisonConfig::new("exact"))
            .pass(&["ssn"], &["fname"], PassRules::default())
            .build()
            .unwrap();

        let missing = Linker::new(config.clone()).run(&ssn_table(), None);
        assert!(matches!(
            missing,
            Err(LinkageError::MissingPredicate { pass: 0, tier: Tier::Strict })
        ));

        let mut registry = AcceptanceRegistry::new(1);
        for tier in Tier::ALL {
            registry.register(0, tier, |s: &ScoreView<'_>| s.score("fname") == 1.0);
        }
        let result = Linker::new(config)
            .with_registry(registry)
            .run(&ssn_table(), None)
            .unwrap();
        assert!(result.results.contains(Tier::Strict, "p1", "p2"));
    }

    #[test]
    fn unknown_blocking_field_fails_before_scoring() {
        let config = LinkageConfig::builder()
            .pass(&["dob"], &[], PassRules::uniform(&Rule::Always))
            .build()
            .unwrap();
        let err = Linker::new(config).run(&ssn_table(), None).unwrap_err();
        assert!(err.is_configuration());
    }
}
