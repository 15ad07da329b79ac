//! Comparator
//!
//! Scores candidate pairs with the comparisons of their pass. Large passes
//! are split into fixed-size chunks scored on the rayon pool; the chunks are
//! merged back in candidate order so the output matches a sequential run.

use indicatif::ProgressBar;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::config::{ComparisonConfig, ParallelConfig};
use crate::error::{LinkageError, Result};
use crate::models::{CandidatePair, FieldValue, Record, ScoredPair, Side, SimilarityVector, TablePair};
use crate::similarity::{Measure, MeasureCatalog, MeasureError};

/// A comparison with its measure resolved and its fields located
#[derive(Debug, Clone)]
pub struct ResolvedComparison {
    name: String,
    measure: Measure,
    left_fields: Vec<usize>,
    right_fields: Vec<usize>,
}

impl ResolvedComparison {
    /// Resolve a named comparison against the catalog and both tables
    ///
    /// # Errors
    ///
    /// Unknown measures, invalid parameters, unknown fields, or a field
    /// count that does not fit the measure.
    pub fn resolve(
        name: &str,
        config: &ComparisonConfig,
        catalog: &MeasureCatalog,
        tables: TablePair<'_>,
    ) -> Result<Self> {
        let measure = catalog.resolve(name, &config.measure, &config.params)?;
        let context = format!("comparison '{name}'");

        let locate = |side: Side| -> Result<Vec<usize>> {
            let fields = config.side_fields(name, side);
            if fields.len() != measure.arity() {
                return Err(LinkageError::InvalidMeasureParameter {
                    comparison: name.to_string(),
                    reason: format!(
                        "measure '{}' reads {} field(s) per side, {} configured on the {side}",
                        measure.name(),
                        measure.arity(),
                        fields.len()
                    ),
                });
            }
            let table = tables.table(side);
            fields
                .iter()
                .map(|field| table.require_field(&context, field))
                .collect()
        };
        let left_fields = locate(Side::Left)?;
        let right_fields = locate(Side::Right)?;

        Ok(Self {
            name: name.to_string(),
            measure,
            left_fields,
            right_fields,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn measure(&self) -> &Measure {
        &self.measure
    }

    /// Score one pair of records
    pub fn score(&self, left: &Record, right: &Record) -> std::result::Result<f64, MeasureError> {
        let left: SmallVec<[&FieldValue; 2]> =
            self.left_fields.iter().map(|&field| left.value(field)).collect();
        let right: SmallVec<[&FieldValue; 2]> =
            self.right_fields.iter().map(|&field| right.value(field)).collect();
        self.measure.score(&left, &right)
    }
}

/// Score one candidate with every comparison of its pass
pub fn score_pair(
    tables: TablePair<'_>,
    pair: CandidatePair,
    comparisons: &[ResolvedComparison],
) -> Result<ScoredPair> {
    let left = tables.left.record(pair.left);
    let right = tables.right.record(pair.right);

    let scores = comparisons
        .iter()
        .map(|comparison| {
            comparison
                .score(left, right)
                .map_err(|reason| LinkageError::MeasureFailure {
                    pass: pair.pass,
                    comparison: comparison.name.clone(),
                    left_id: left.id().to_string(),
                    right_id: right.id().to_string(),
                    reason: reason.to_string(),
                })
        })
        .collect::<Result<Vec<f64>>>()?;

    Ok(ScoredPair {
        pair,
        scores: SimilarityVector::new(scores),
    })
}

fn score_chunk(
    tables: TablePair<'_>,
    chunk: &[CandidatePair],
    comparisons: &[ResolvedComparison],
    progress: &ProgressBar,
) -> Result<Vec<ScoredPair>> {
    let scored = chunk
        .iter()
        .map(|&pair| score_pair(tables, pair, comparisons))
        .collect::<Result<Vec<_>>>()?;
    progress.inc(chunk.len() as u64);
    Ok(scored)
}

/// Score all candidates of a pass
///
/// The output has one entry per candidate, in candidate order.
///
/// # Errors
///
/// [`LinkageError::MeasureFailure`] for the first pair a measure cannot
/// score; the whole pass fails.
pub fn compare(
    tables: TablePair<'_>,
    candidates: &[CandidatePair],
    comparisons: &[ResolvedComparison],
    parallel: &ParallelConfig,
    progress: &ProgressBar,
) -> Result<Vec<ScoredPair>> {
    let chunk_size = parallel.chunk_size.max(1);

    if parallel.use_parallel(candidates.len()) {
        // Chunks are collected in candidate order; the first failure wins.
        let chunks: Vec<Result<Vec<ScoredPair>>> = candidates
            .par_chunks(chunk_size)
            .map(|chunk| score_chunk(tables, chunk, comparisons, progress))
            .collect();
        let mut scored = Vec::with_capacity(candidates.len());
        for chunk in chunks {
            scored.extend(chunk?);
        }
        Ok(scored)
    } else {
        let mut scored = Vec::with_capacity(candidates.len());
        for chunk in candidates.chunks(chunk_size) {
            scored.extend(score_chunk(tables, chunk, comparisons, progress)?);
        }
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PassId, RecordTable};
    use crate::similarity::MeasureParams;

    fn tables() -> (RecordTable, RecordTable) {
        let left = RecordTable::builder("a", &["fname", "lname", "byear"])
            .record("a1", ["ann", "lee", "1980"])
            .record("a2", ["bob", "", "19x0"])
            .build()
            .unwrap();
        let right = RecordTable::builder("b", &["fname", "lname", "byear"])
            .record("b1", ["lee", "ann", "1981"])
            .build()
            .unwrap();
        (left, right)
    }

    fn byear() -> ComparisonConfig {
        ComparisonConfig::new("byear").with_params(MeasureParams {
            within_1y: Some(0.7),
            missing_value: Some(0.5),
            ..MeasureParams::default()
        })
    }

    #[test]
    fn scores_in_comparison_order() {
        let (left, right) = tables();
        let pair = TablePair::link(&left, &right);
        let catalog = MeasureCatalog::default();
        let comparisons = vec![
            ResolvedComparison::resolve("byear", &byear(), &catalog, pair).unwrap(),
            ResolvedComparison::resolve(
                "fnamelname",
                &ComparisonConfig::new("jarowinkler").with_side_fields(&["fname"], &["lname"]),
                &catalog,
                pair,
            )
            .unwrap(),
        ];

        let scored = score_pair(pair, CandidatePair::new(0, 0, PassId::Blocking(0)), &comparisons)
            .unwrap();
        assert_eq!(scored.scores.as_slice(), &[0.7, 1.0]);
    }

    #[test]
    fn measure_failure_names_pair() {
        let (left, right) = tables();
        let pair = TablePair::link(&left, &right);
        let comparisons =
            vec![ResolvedComparison::resolve("byear", &byear(), &MeasureCatalog::default(), pair).unwrap()];

        let err = score_pair(pair, CandidatePair::new(1, 0, PassId::Blocking(2)), &comparisons)
            .unwrap_err();
        match err {
            LinkageError::MeasureFailure {
                pass,
                comparison,
                left_id,
                right_id,
                ..
            } => {
                assert_eq!(pass, PassId::Blocking(2));
                assert_eq!(comparison, "byear");
                assert_eq!((left_id.as_str(), right_id.as_str()), ("a2", "b1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn resolution_checks_fields_and_arity() {
        let (left, right) = tables();
        let pair = TablePair::link(&left, &right);
        let catalog = MeasureCatalog::default();

        let unknown = ResolvedComparison::resolve("zip", &ComparisonConfig::new("exact"), &catalog, pair);
        assert!(matches!(unknown, Err(LinkageError::UnknownField { .. })));

        let two_fields = ComparisonConfig::new("exact").with_fields(&["fname", "lname"]);
        let arity = ResolvedComparison::resolve("names", &two_fields, &catalog, pair);
        assert!(matches!(arity, Err(LinkageError::InvalidMeasureParameter { .. })));
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut builder = RecordTable::builder("people", &["fname"]);
        for i in 0..200 {
            builder = builder.record(format!("p{i}"), [format!("name{}", i % 17)]);
        }
        let table = builder.build().unwrap();
        let pair = TablePair::dedup(&table);
        let comparisons = vec![
            ResolvedComparison::resolve(
                "fname",
                &ComparisonConfig::new("levenshtein"),
                &MeasureCatalog::default(),
                pair,
            )
            .unwrap(),
        ];
        let candidates: Vec<_> = (0..200)
            .flat_map(|l| ((l + 1)..200).map(move |r| CandidatePair::new(l, r, PassId::Blocking(0))))
            .collect();

        let sequential = ParallelConfig {
            enabled: false,
            ..ParallelConfig::default()
        };
        let parallel = ParallelConfig {
            enabled: true,
            num_threads: None,
            chunk_size: 97,
            threshold: 0,
        };
        let hidden = ProgressBar::hidden();
        let a = compare(pair, &candidates, &comparisons, &sequential, &hidden).unwrap();
        let b = compare(pair, &candidates, &comparisons, &parallel, &hidden).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), candidates.len());
    }

    #[test]
    fn parallel_failure_is_first_in_candidate_order() {
        let mut builder = RecordTable::builder("people", &["byear"]);
        for i in 0..40 {
            let year = if matches!(i, 7 | 23 | 31) { "19x0".to_string() } else { (1950 + i).to_string() };
            builder = builder.record(format!("p{i}"), [year]);
        }
        let table = builder.build().unwrap();
        let pair = TablePair::dedup(&table);
        let comparisons =
            vec![ResolvedComparison::resolve("byear", &byear(), &MeasureCatalog::default(), pair).unwrap()];
        let candidates: Vec<_> = (0..40)
            .flat_map(|l| ((l + 1)..40).map(move |r| CandidatePair::new(l, r, PassId::Blocking(0))))
            .collect();
        let parallel = ParallelConfig {
            enabled: true,
            num_threads: None,
            chunk_size: 1,
            threshold: 0,
        };

        for _ in 0..20 {
            match compare(pair, &candidates, &comparisons, &parallel, &ProgressBar::hidden()) {
                Err(LinkageError::MeasureFailure { left_id, right_id, .. }) => {
                    assert_eq!((left_id.as_str(), right_id.as_str()), ("p0", "p7"));
                }
                other => panic!("expected a measure failure, got {other:?}"),
            }
        }
    }
}
