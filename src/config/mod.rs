//! Configuration for linkage runs.
//!
//! [`LinkageConfig`] describes the matching strategy: the blocking passes,
//! the comparisons scored in each pass, and the acceptance rules of every
//! pass and tier. [`RunConfig`] adds the input tables and the output
//! directory used by the command line tool. Both are read from JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::algorithm::linkage::resolution::{Cardinality, ConflictPolicy};
use crate::algorithm::linkage::rules::Rule;
use crate::error::{LinkageError, Result};
use crate::models::{Side, Tier};
use crate::similarity::MeasureParams;

/// Suffix marking a blocking field compared across swapped fields
pub const INVERTED_SUFFIX: &str = "_inv";

/// Definition of a named comparison
///
/// The fields read on each side default to `fields`, and `fields` defaults
/// to the comparison's own name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    /// Registered measure name
    #[serde(alias = "comparer")]
    pub measure: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_fields: Option<Vec<String>>,
    #[serde(flatten)]
    pub params: MeasureParams,
}

impl ComparisonConfig {
    pub fn new(measure: impl Into<String>) -> Self {
        Self {
            measure: measure.into(),
            fields: Vec::new(),
            left_fields: None,
            right_fields: None,
            params: MeasureParams::default(),
        }
    }

    #[must_use]
    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(ToString::to_string).collect();
        self
    }

    /// Read different fields on each side, e.g. first name against last name
    #[must_use]
    pub fn with_side_fields(mut self, left: &[&str], right: &[&str]) -> Self {
        self.left_fields = Some(left.iter().map(ToString::to_string).collect());
        self.right_fields = Some(right.iter().map(ToString::to_string).collect());
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: MeasureParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_missing_value(mut self, missing_value: f64) -> Self {
        self.params.missing_value = Some(missing_value);
        self
    }

    /// Fields read from one side for the comparison called `name`
    #[must_use]
    pub fn side_fields(&self, name: &str, side: Side) -> Vec<String> {
        let explicit = match side {
            Side::Left => self.left_fields.as_ref(),
            Side::Right => self.right_fields.as_ref(),
        };
        match explicit {
            Some(fields) => fields.clone(),
            None if self.fields.is_empty() => vec![name.to_string()],
            None => self.fields.clone(),
        }
    }
}

/// Acceptance rules of one pass, one per tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassRules {
    pub strict: Option<Rule>,
    pub moderate: Option<Rule>,
    pub relaxed: Option<Rule>,
    pub review: Option<Rule>,
}

impl PassRules {
    #[must_use]
    pub const fn new(strict: Rule, moderate: Rule, relaxed: Rule, review: Rule) -> Self {
        Self {
            strict: Some(strict),
            moderate: Some(moderate),
            relaxed: Some(relaxed),
            review: Some(review),
        }
    }

    /// Same rule at every tier
    #[must_use]
    pub fn uniform(rule: &Rule) -> Self {
        Self::new(rule.clone(), rule.clone(), rule.clone(), rule.clone())
    }

    #[must_use]
    pub const fn get(&self, tier: Tier) -> Option<&Rule> {
        match tier {
            Tier::Strict => self.strict.as_ref(),
            Tier::Moderate => self.moderate.as_ref(),
            Tier::Relaxed => self.relaxed.as_ref(),
            Tier::Review => self.review.as_ref(),
        }
    }
}

/// Parallel scoring settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Whether candidate chunks are scored on the rayon pool
    pub enabled: bool,
    /// Number of worker threads, defaults to the number of CPUs
    pub num_threads: Option<usize>,
    /// Candidates per work unit
    pub chunk_size: usize,
    /// Passes with fewer candidates are scored sequentially
    pub threshold: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_threads: None,
            chunk_size: 50_000,
            threshold: 1000,
        }
    }
}

impl ParallelConfig {
    /// Whether a pass with `candidates` pairs should be scored in parallel
    #[must_use]
    pub const fn use_parallel(&self, candidates: usize) -> bool {
        self.enabled && candidates >= self.threshold
    }
}

/// Matching strategy of a linkage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkageConfig {
    /// How many partners a record may keep in the final result
    pub cardinality: Cardinality,
    /// Trusted identifier fields; records sharing one are accepted up front
    pub ground_truth_ids: Vec<String>,
    /// Blocking fields per pass; an empty list compares all remaining records
    pub blocks_by_pass: Vec<Vec<String>>,
    /// Ordered comparison names per pass
    pub comp_names_by_pass: Vec<Vec<String>>,
    /// Comparison definitions by name
    #[serde(alias = "sim_param")]
    pub comparisons: BTreeMap<String, ComparisonConfig>,
    /// Acceptance rules per pass
    pub acceptance_by_pass: Vec<PassRules>,
    /// Named score thresholds usable in rules
    #[serde(alias = "cutoff_scores")]
    pub thresholds: BTreeMap<String, f64>,
    /// Named sub-rules usable in rules
    pub masks: BTreeMap<String, Rule>,
    /// How cardinality conflicts are decided
    pub conflict_policy: ConflictPolicy,
    /// Loosest tier whose acceptance removes a record from later passes
    pub exclude_on: Tier,
    /// Skip pairs that were already candidates in an earlier pass
    pub skip_seen_pairs: bool,
    pub parallel: ParallelConfig,
    /// Draw progress bars while scoring
    pub show_progress: bool,
}

impl Default for LinkageConfig {
    fn default() -> Self {
        Self {
            cardinality: Cardinality::default(),
            ground_truth_ids: Vec::new(),
            blocks_by_pass: Vec::new(),
            comp_names_by_pass: Vec::new(),
            comparisons: BTreeMap::new(),
            acceptance_by_pass: Vec::new(),
            thresholds: BTreeMap::new(),
            masks: BTreeMap::new(),
            conflict_policy: ConflictPolicy::default(),
            exclude_on: Tier::Review,
            skip_seen_pairs: false,
            parallel: ParallelConfig::default(),
            show_progress: false,
        }
    }
}

impl LinkageConfig {
    /// Create a new builder for constructing a configuration
    #[must_use]
    pub fn builder() -> LinkageConfigBuilder {
        LinkageConfigBuilder::new()
    }

    /// Parse a configuration from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Number of blocking passes
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.blocks_by_pass.len()
    }

    /// Check the per-pass structures agree on the number of passes
    ///
    /// An empty `acceptance_by_pass` is accepted here; it is then the
    /// acceptance registry's job to cover every pass.
    ///
    /// # Returns
    ///
    /// The number of blocking passes
    pub fn validate_alignment(&self) -> Result<usize> {
        let expected = self.blocks_by_pass.len();
        if self.comp_names_by_pass.len() != expected {
            return Err(LinkageError::PassCountMismatch {
                structure: "comp_names_by_pass",
                expected,
                found: self.comp_names_by_pass.len(),
            });
        }
        if !self.acceptance_by_pass.is_empty() && self.acceptance_by_pass.len() != expected {
            return Err(LinkageError::PassCountMismatch {
                structure: "acceptance_by_pass",
                expected,
                found: self.acceptance_by_pass.len(),
            });
        }
        Ok(expected)
    }

    /// Structural validation that needs neither tables nor measures
    pub fn validate(&self) -> Result<()> {
        let passes = self.validate_alignment()?;
        if passes == 0 && self.ground_truth_ids.is_empty() {
            return Err(LinkageError::ConfigValidation(
                "no blocking passes or ground-truth ids configured".to_string(),
            ));
        }

        for (pass, fields) in self.blocks_by_pass.iter().enumerate() {
            check_names(fields, &format!("blocks_by_pass[{pass}]"))?;
        }
        check_names(&self.ground_truth_ids, "ground_truth_ids")?;

        for (pass, names) in self.comp_names_by_pass.iter().enumerate() {
            check_names(names, &format!("comp_names_by_pass[{pass}]"))?;
            if let Some(name) = names.iter().find(|name| !self.comparisons.contains_key(*name)) {
                return Err(LinkageError::UnknownComparison {
                    pass,
                    name: name.clone(),
                });
            }
        }

        for (name, comparison) in &self.comparisons {
            let left = comparison.side_fields(name, Side::Left);
            let right = comparison.side_fields(name, Side::Right);
            if left.len() != right.len() {
                return Err(LinkageError::InvalidMeasureParameter {
                    comparison: name.clone(),
                    reason: format!(
                        "reads {} field(s) on the left but {} on the right",
                        left.len(),
                        right.len()
                    ),
                });
            }
        }

        if let Some((name, value)) = self.thresholds.iter().find(|(_, value)| !value.is_finite()) {
            return Err(LinkageError::ConfigValidation(format!(
                "threshold '{name}' is {value}"
            )));
        }
        if self.parallel.chunk_size == 0 {
            return Err(LinkageError::ConfigValidation(
                "parallel.chunk_size must be positive".to_string(),
            ));
        }
        if self.parallel.num_threads == Some(0) {
            return Err(LinkageError::ConfigValidation(
                "parallel.num_threads must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_names(names: &[String], context: &str) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(LinkageError::ConfigValidation(format!(
                "{context} contains an empty name"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(LinkageError::ConfigValidation(format!(
                "{context} lists '{name}' twice"
            )));
        }
    }
    Ok(())
}

impl fmt::Display for LinkageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Linkage configuration:")?;
        writeln!(f, " - Cardinality: {}", self.cardinality)?;
        if !self.ground_truth_ids.is_empty() {
            writeln!(f, " - Ground-truth ids: {}", self.ground_truth_ids.join(", "))?;
        }
        for (pass, fields) in self.blocks_by_pass.iter().enumerate() {
            let comparisons = self.comp_names_by_pass.get(pass).map_or(0, Vec::len);
            if fields.is_empty() {
                writeln!(f, " - Pass {pass}: no blocking, {comparisons} comparisons")?;
            } else {
                writeln!(
                    f,
                    " - Pass {pass}: blocking on {}, {comparisons} comparisons",
                    fields.join(", ")
                )?;
            }
        }
        write!(f, " - Records excluded after acceptance at {} or stricter", self.exclude_on)
    }
}

/// Builder for constructing a linkage configuration
#[derive(Debug, Clone, Default)]
pub struct LinkageConfigBuilder {
    config: LinkageConfig,
}

impl LinkageConfigBuilder {
    /// Create a new builder with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a blocking pass
    ///
    /// # Arguments
    ///
    /// * `blocking` - Blocking fields, empty to compare every remaining record
    /// * `comparisons` - Ordered comparison names scored in the pass
    /// * `rules` - Acceptance rules of the pass
    #[must_use]
    pub fn pass(mut self, blocking: &[&str], comparisons: &[&str], rules: PassRules) -> Self {
        self.config
            .blocks_by_pass
            .push(blocking.iter().map(ToString::to_string).collect());
        self.config
            .comp_names_by_pass
            .push(comparisons.iter().map(ToString::to_string).collect());
        self.config.acceptance_by_pass.push(rules);
        self
    }

    /// Define a named comparison
    #[must_use]
    pub fn comparison(mut self, name: &str, comparison: ComparisonConfig) -> Self {
        self.config.comparisons.insert(name.to_string(), comparison);
        self
    }

    #[must_use]
    pub fn threshold(mut self, name: &str, value: f64) -> Self {
        self.config.thresholds.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn mask(mut self, name: &str, rule: Rule) -> Self {
        self.config.masks.insert(name.to_string(), rule);
        self
    }

    #[must_use]
    pub fn ground_truth_id(mut self, field: &str) -> Self {
        self.config.ground_truth_ids.push(field.to_string());
        self
    }

    #[must_use]
    pub const fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.config.cardinality = cardinality;
        self
    }

    #[must_use]
    pub const fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.config.conflict_policy = policy;
        self
    }

    #[must_use]
    pub const fn exclude_on(mut self, tier: Tier) -> Self {
        self.config.exclude_on = tier;
        self
    }

    #[must_use]
    pub const fn skip_seen_pairs(mut self, skip: bool) -> Self {
        self.config.skip_seen_pairs = skip;
        self
    }

    #[must_use]
    pub const fn parallel(mut self, enabled: bool) -> Self {
        self.config.parallel.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn num_threads(mut self, threads: usize) -> Self {
        self.config.parallel.num_threads = Some(threads);
        self
    }

    #[must_use]
    pub const fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.parallel.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub const fn parallel_threshold(mut self, threshold: usize) -> Self {
        self.config.parallel.threshold = threshold;
        self
    }

    #[must_use]
    pub const fn show_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    /// Build the configuration, validating its structure
    pub fn build(self) -> Result<LinkageConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// File format of an input table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Parquet,
}

impl SourceFormat {
    /// Guess the format from a file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(Self::Csv),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// Where an input table comes from and how its columns map to fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSource {
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<SourceFormat>,
    /// Column holding the record identifier
    pub id_field: String,
    /// Standardized field name to source column; empty reads every column
    /// under its own name
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Field delimiter of CSV files
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

const fn default_delimiter() -> char {
    ','
}

impl TableSource {
    /// Format of the source, explicit or derived from the path
    pub fn resolved_format(&self) -> Result<SourceFormat> {
        self.format
            .or_else(|| SourceFormat::from_path(&self.path))
            .ok_or_else(|| {
                LinkageError::ConfigValidation(format!(
                    "cannot tell the format of table '{}' from {}",
                    self.name,
                    self.path.display()
                ))
            })
    }
}

/// Input tables of a run; without `right` the left table is deduplicated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    pub left: TableSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<TableSource>,
}

/// A complete run: inputs, output directory and strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub input: InputConfig,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub linkage: LinkageConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("linkage_output")
}

impl RunConfig {
    /// Read a run configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| LinkageError::file(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    #[must_use]
    pub const fn is_dedup(&self) -> bool {
        self.input.right.is_none()
    }
}
