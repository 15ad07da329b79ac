//! Writing linkage results
//!
//! A finished run is written to a directory:
//!
//! - `pairwise_scores.csv`: every accepted pair with its tiers, weight and
//!   scores, heaviest first
//! - `matches_<tier>.csv`: resolved pairs of each tier
//! - `superseded_<tier>.csv`: pairs removed by cardinality resolution
//! - `summary.json`: run and per-pass counts

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use itertools::Itertools;
use serde::Serialize;

use crate::algorithm::linkage::linker::{LinkageResult, PassSummary};
use crate::algorithm::linkage::resolution::{Cardinality, MatchedPair, TierPartition};
use crate::config::LinkageConfig;
use crate::error::{LinkageError, Result};
use crate::models::{PassId, Tier};
use crate::utils::logging::{log_operation_complete, log_operation_start};

const MATCHES_HEADER: [&str; 5] = ["left_id", "right_id", "pass", "tier", "score"];

/// Run-level summary written to `summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub dedup: bool,
    pub cardinality: Cardinality,
    pub pass_count: usize,
    pub candidates: usize,
    pub accepted: usize,
    pub matches: BTreeMap<Tier, usize>,
    pub superseded: BTreeMap<Tier, usize>,
    pub elapsed_secs: f64,
    pub passes: Vec<PassSummary>,
}

impl RunSummary {
    #[must_use]
    pub fn new(result: &LinkageResult) -> Self {
        let count = |len: fn(&TierPartition) -> usize| -> BTreeMap<Tier, usize> {
            result
                .results
                .partitions()
                .map(|partition| (partition.tier, len(partition)))
                .collect()
        };
        Self {
            dedup: result.dedup,
            cardinality: result.results.cardinality(),
            pass_count: result.pass_count,
            candidates: result.candidates(),
            accepted: result.accepted.len(),
            matches: count(|partition| partition.matches.len()),
            superseded: count(|partition| partition.superseded.len()),
            elapsed_secs: result.elapsed.as_secs_f64(),
            passes: result.summaries.clone(),
        }
    }
}

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer)
}

fn flag(set: bool) -> &'static str {
    if set { "1" } else { "0" }
}

/// Comparison names of all passes, in order of first use
fn score_columns(config: &LinkageConfig) -> Vec<&str> {
    config
        .comp_names_by_pass
        .iter()
        .flatten()
        .map(String::as_str)
        .unique()
        .collect()
}

/// Write every accepted pair, heaviest first
///
/// Scores a pass did not compute are left empty, as are all scores of a
/// pass `config` does not describe.
pub fn write_pairwise_scores(result: &LinkageResult, config: &LinkageConfig, writer: impl Write) -> Result<()> {
    let columns = score_columns(config);
    let mut csv = csv_writer(writer);

    let header = ["left_id", "right_id", "pass", "strict", "moderate", "relaxed", "review", "weight"]
        .into_iter()
        .chain(columns.iter().copied());
    csv.write_record(header)?;

    let weighted = result
        .accepted
        .iter()
        .map(|pair| (result.weight(pair), pair))
        .sorted_by(|(a_weight, a), (b_weight, b)| {
            b_weight
                .total_cmp(a_weight)
                .then_with(|| (&a.left_id, &a.right_id).cmp(&(&b.left_id, &b.right_id)))
        });

    for (weight, pair) in weighted {
        let names: &[String] = match pair.pass {
            PassId::Blocking(pass) => config.comp_names_by_pass.get(pass).map_or(&[][..], Vec::as_slice),
            PassId::GroundTruth(_) => &[],
        };
        let scores = columns.iter().map(|column| {
            names
                .iter()
                .position(|name| name.as_str() == *column)
                .and_then(|position| pair.scores.get(position))
                .map(|score| score.to_string())
                .unwrap_or_default()
        });

        let record = [
            pair.left_id.clone(),
            pair.right_id.clone(),
            pair.pass.to_string(),
            flag(pair.accepted_at(Tier::Strict)).to_string(),
            flag(pair.accepted_at(Tier::Moderate)).to_string(),
            flag(pair.accepted_at(Tier::Relaxed)).to_string(),
            flag(pair.accepted_at(Tier::Review)).to_string(),
            weight.to_string(),
        ]
        .into_iter()
        .chain(scores);
        csv.write_record(record)?;
    }

    csv.flush()?;
    Ok(())
}

fn match_fields(pair: &MatchedPair) -> [String; 5] {
    [
        pair.left_id.clone(),
        pair.right_id.clone(),
        pair.pass.to_string(),
        pair.tier.to_string(),
        pair.score.to_string(),
    ]
}

/// Write the resolved pairs of one tier
pub fn write_matches(partition: &TierPartition, writer: impl Write) -> Result<()> {
    let mut csv = csv_writer(writer);
    csv.write_record(MATCHES_HEADER)?;
    for pair in &partition.matches {
        csv.write_record(match_fields(pair))?;
    }
    csv.flush()?;
    Ok(())
}

/// Write the superseded pairs of one tier with the reason each lost
pub fn write_superseded(partition: &TierPartition, writer: impl Write) -> Result<()> {
    let mut csv = csv_writer(writer);
    csv.write_record(MATCHES_HEADER.into_iter().chain(["reason"]))?;
    for superseded in &partition.superseded {
        let reason = superseded.reason.to_string();
        csv.write_record(match_fields(&superseded.pair).into_iter().chain([reason]))?;
    }
    csv.flush()?;
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| LinkageError::file(path, e))
}

/// Write all result files of a run into `dir`
///
/// # Returns
///
/// The paths written, in writing order
pub fn write_results(dir: &Path, result: &LinkageResult, config: &LinkageConfig) -> Result<Vec<PathBuf>> {
    let start = Instant::now();
    log_operation_start("Writing linkage results to", dir);
    fs::create_dir_all(dir).map_err(|e| LinkageError::file(dir, e))?;

    let mut written = Vec::new();

    let path = dir.join("pairwise_scores.csv");
    write_pairwise_scores(result, config, create(&path)?)?;
    written.push(path);

    for partition in result.results.partitions() {
        let path = dir.join(format!("matches_{}.csv", partition.tier));
        write_matches(partition, create(&path)?)?;
        written.push(path);

        let path = dir.join(format!("superseded_{}.csv", partition.tier));
        write_superseded(partition, create(&path)?)?;
        written.push(path);
    }

    let path = dir.join("summary.json");
    let mut writer = create(&path)?;
    serde_json::to_writer_pretty(&mut writer, &RunSummary::new(result))?;
    writer.flush().map_err(|e| LinkageError::file(&path, e))?;
    written.push(path);

    log_operation_complete("wrote", dir, written.len(), Some(start.elapsed()));
    Ok(written)
}
