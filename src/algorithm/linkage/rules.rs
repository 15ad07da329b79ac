//! Rule expressions for acceptance predicates
//!
//! A [`Rule`] is a boolean expression over the similarity scores of one
//! pass. Rules are written in the configuration file, may refer to named
//! thresholds and to named masks (reusable sub-rules), and are compiled
//! against the comparison list of their pass before any pair is scored.
//!
//! ```json
//! {"all": [
//!     {"score": {"name": "fname", "op": ">=", "value": "name_high_score"}},
//!     {"mask": "dob_partial"}
//! ]}
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algorithm::linkage::acceptance::{AcceptancePredicate, ScoreView};

/// Comparison operator of a score condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
}

impl CompareOp {
    /// Apply the operator; every comparison involving NaN is false
    #[must_use]
    pub fn apply(self, left: f64, right: f64) -> bool {
        if left.is_nan() || right.is_nan() {
            return false;
        }
        match self {
            Self::Eq => left == right,
            Self::NotEq => left != right,
            Self::Gt => left > right,
            Self::GtEq => left >= right,
            Self::Lt => left < right,
            Self::LtEq => left <= right,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Lt => "<",
            Self::LtEq => "<=",
        };
        f.write_str(symbol)
    }
}

/// Right-hand side of a score condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    /// Literal score
    Value(f64),
    /// Named threshold
    Named(String),
    /// Named threshold shifted by an offset
    Threshold {
        threshold: String,
        #[serde(default)]
        offset: f64,
    },
}

impl Bound {
    pub fn threshold(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn offset(name: impl Into<String>, offset: f64) -> Self {
        Self::Threshold {
            threshold: name.into(),
            offset,
        }
    }

    fn resolve(&self, thresholds: &BTreeMap<String, f64>) -> Result<f64, String> {
        let (name, offset) = match self {
            Self::Value(value) => return Ok(*value),
            Self::Named(name) => (name, 0.0),
            Self::Threshold { threshold, offset } => (threshold, *offset),
        };
        thresholds
            .get(name)
            .map(|value| value + offset)
            .ok_or_else(|| format!("unknown threshold '{name}'"))
    }
}

impl From<f64> for Bound {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Bound {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

/// `score <op> value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCondition {
    /// Comparison name within the pass
    pub name: String,
    pub op: CompareOp,
    pub value: Bound,
}

/// Boolean expression over the scores of one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Accepts every pair
    Always,
    /// Rejects every pair
    Never,
    /// Logical AND; an empty list accepts
    All(Vec<Rule>),
    /// Logical OR; an empty list rejects
    Any(Vec<Rule>),
    /// Logical NOT
    Not(Box<Rule>),
    /// Reference to a named mask
    Mask(String),
    /// Single score condition
    Score(ScoreCondition),
    /// `low <= score <= high`
    Between {
        score: String,
        low: Bound,
        high: Bound,
    },
}

impl Rule {
    #[must_use]
    pub const fn all(rules: Vec<Self>) -> Self {
        Self::All(rules)
    }

    #[must_use]
    pub const fn any(rules: Vec<Self>) -> Self {
        Self::Any(rules)
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(rule: Self) -> Self {
        Self::Not(Box::new(rule))
    }

    pub fn mask(name: impl Into<String>) -> Self {
        Self::Mask(name.into())
    }

    pub fn score(name: impl Into<String>, op: CompareOp, value: impl Into<Bound>) -> Self {
        Self::Score(ScoreCondition {
            name: name.into(),
            op,
            value: value.into(),
        })
    }

    pub fn at_least(name: impl Into<String>, value: impl Into<Bound>) -> Self {
        Self::score(name, CompareOp::GtEq, value)
    }

    pub fn equals(name: impl Into<String>, value: impl Into<Bound>) -> Self {
        Self::score(name, CompareOp::Eq, value)
    }

    pub fn between(name: impl Into<String>, low: impl Into<Bound>, high: impl Into<Bound>) -> Self {
        Self::Between {
            score: name.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    /// Conjunction with another rule, flattening nested `all`
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::All(mut rules) => {
                rules.push(other);
                Self::All(rules)
            }
            rule => Self::All(vec![rule, other]),
        }
    }

    /// Disjunction with another rule, flattening nested `any`
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Any(mut rules) => {
                rules.push(other);
                Self::Any(rules)
            }
            rule => Self::Any(vec![rule, other]),
        }
    }

    /// Comparison names referenced directly by this rule, masks not expanded
    #[must_use]
    pub fn referenced_scores(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_referenced_scores(&mut names);
        names
    }

    fn collect_referenced_scores(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Score(condition) => {
                names.insert(condition.name.clone());
            }
            Self::Between { score, .. } => {
                names.insert(score.clone());
            }
            Self::All(rules) | Self::Any(rules) => {
                for rule in rules {
                    rule.collect_referenced_scores(names);
                }
            }
            Self::Not(rule) => rule.collect_referenced_scores(names),
            Self::Always | Self::Never | Self::Mask(_) => {}
        }
    }

    /// Compile against the comparisons, thresholds and masks of a pass
    ///
    /// # Errors
    ///
    /// A description of the first unknown comparison, threshold or mask, or
    /// of a mask that refers back to itself.
    pub fn compile(&self, context: &RuleContext<'_>) -> Result<CompiledRule, String> {
        let mut stack = Vec::new();
        Ok(CompiledRule {
            root: compile_node(self, context, &mut stack)?,
        })
    }
}

/// Names a rule can refer to when it is compiled
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    comparisons: &'a [String],
    thresholds: &'a BTreeMap<String, f64>,
    masks: &'a BTreeMap<String, Rule>,
}

impl<'a> RuleContext<'a> {
    #[must_use]
    pub const fn new(
        comparisons: &'a [String],
        thresholds: &'a BTreeMap<String, f64>,
        masks: &'a BTreeMap<String, Rule>,
    ) -> Self {
        Self {
            comparisons,
            thresholds,
            masks,
        }
    }

    fn position(&self, comparison: &str) -> Result<usize, String> {
        self.comparisons
            .iter()
            .position(|name| name == comparison)
            .ok_or_else(|| {
                format!(
                    "score '{comparison}' is not compared in this pass (compared: [{}])",
                    self.comparisons.join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Const(bool),
    All(Vec<Node>),
    Any(Vec<Node>),
    Not(Box<Node>),
    Compare {
        position: usize,
        op: CompareOp,
        value: f64,
    },
    Between {
        position: usize,
        low: f64,
        high: f64,
    },
}

fn compile_node(rule: &Rule, context: &RuleContext<'_>, stack: &mut Vec<String>) -> Result<Node, String> {
    Ok(match rule {
        Rule::Always => Node::Const(true),
        Rule::Never => Node::Const(false),
        Rule::All(rules) => Node::All(
            rules
                .iter()
                .map(|rule| compile_node(rule, context, stack))
                .collect::<Result<_, _>>()?,
        ),
        Rule::Any(rules) => Node::Any(
            rules
                .iter()
                .map(|rule| compile_node(rule, context, stack))
                .collect::<Result<_, _>>()?,
        ),
        Rule::Not(rule) => Node::Not(Box::new(compile_node(rule, context, stack)?)),
        Rule::Mask(name) => {
            if stack.contains(name) {
                return Err(format!(
                    "mask cycle: {} -> {name}",
                    stack.join(" -> ")
                ));
            }
            let mask = context
                .masks
                .get(name)
                .ok_or_else(|| format!("unknown mask '{name}'"))?;
            stack.push(name.clone());
            let node = compile_node(mask, context, stack)
                .map_err(|reason| format!("in mask '{name}': {reason}"))?;
            stack.pop();
            node
        }
        Rule::Score(condition) => Node::Compare {
            position: context.position(&condition.name)?,
            op: condition.op,
            value: condition.value.resolve(context.thresholds)?,
        },
        Rule::Between { score, low, high } => Node::Between {
            position: context.position(score)?,
            low: low.resolve(context.thresholds)?,
            high: high.resolve(context.thresholds)?,
        },
    })
}

impl Node {
    fn evaluate(&self, scores: &ScoreView<'_>) -> bool {
        match self {
            Self::Const(value) => *value,
            Self::All(nodes) => nodes.iter().all(|node| node.evaluate(scores)),
            Self::Any(nodes) => nodes.iter().any(|node| node.evaluate(scores)),
            Self::Not(node) => !node.evaluate(scores),
            Self::Compare {
                position,
                op,
                value,
            } => op.apply(scores.at(*position).unwrap_or(f64::NAN), *value),
            Self::Between {
                position,
                low,
                high,
            } => {
                let score = scores.at(*position).unwrap_or(f64::NAN);
                score >= *low && score <= *high
            }
        }
    }
}

/// A rule with names resolved to vector positions and threshold values
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    root: Node,
}

impl CompiledRule {
    #[must_use]
    pub fn matches(&self, scores: &ScoreView<'_>) -> bool {
        self.root.evaluate(scores)
    }
}

impl AcceptancePredicate for CompiledRule {
    fn evaluate(&self, scores: &ScoreView<'_>) -> bool {
        self.matches(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SimilarityVector;

    struct Fixture {
        comparisons: Vec<String>,
        thresholds: BTreeMap<String, f64>,
        masks: BTreeMap<String, Rule>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut thresholds = BTreeMap::new();
            thresholds.insert("name_high".to_string(), 0.88);
            thresholds.insert("review".to_string(), 0.8);

            let mut masks = BTreeMap::new();
            masks.insert(
                "dob_exact".to_string(),
                Rule::all(vec![Rule::equals("byear", 1.0), Rule::equals("bmonthbday", 1.0)]),
            );
            Self {
                comparisons: ["fname", "lname", "byear", "bmonthbday"]
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                thresholds,
                masks,
            }
        }

        fn context(&self) -> RuleContext<'_> {
            RuleContext::new(&self.comparisons, &self.thresholds, &self.masks)
        }

        fn check(&self, rule: &Rule, scores: Vec<f64>) -> bool {
            let compiled = rule.compile(&self.context()).unwrap();
            let scores = SimilarityVector::new(scores);
            compiled.matches(&ScoreView::new(&self.comparisons, &scores))
        }
    }

    #[test]
    fn evaluates_nested_rules() {
        let fixture = Fixture::new();
        let rule = Rule::at_least("fname", Bound::threshold("name_high"))
            .and(Rule::at_least("lname", Bound::threshold("name_high")))
            .and(Rule::mask("dob_exact"));

        assert!(fixture.check(&rule, vec![0.9, 0.95, 1.0, 1.0]));
        assert!(!fixture.check(&rule, vec![0.9, 0.95, 0.7, 1.0]));
        assert!(!fixture.check(&rule, vec![0.5, 0.95, 1.0, 1.0]));

        let either = Rule::equals("fname", 1.0).or(Rule::not(Rule::mask("dob_exact")));
        assert!(fixture.check(&either, vec![0.0, 0.0, 0.7, 1.0]));
        assert!(!fixture.check(&either, vec![0.0, 0.0, 1.0, 1.0]));
    }

    #[test]
    fn offsets_and_between() {
        let fixture = Fixture::new();
        let relaxed = Rule::at_least("fname", Bound::offset("review", -0.1));
        assert!(fixture.check(&relaxed, vec![0.71, 0.0, 0.0, 0.0]));
        assert!(!fixture.check(&relaxed, vec![0.69, 0.0, 0.0, 0.0]));

        let partial = Rule::between("bmonthbday", 0.6, 0.8);
        assert!(fixture.check(&partial, vec![0.0, 0.0, 0.0, 0.6]));
        assert!(!fixture.check(&partial, vec![0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn empty_combinators() {
        let fixture = Fixture::new();
        assert!(fixture.check(&Rule::all(vec![]), vec![0.0; 4]));
        assert!(!fixture.check(&Rule::any(vec![]), vec![0.0; 4]));
        assert!(fixture.check(&Rule::Always, vec![0.0; 4]));
        assert!(!fixture.check(&Rule::Never, vec![0.0; 4]));
    }

    #[test]
    fn compile_errors() {
        let mut fixture = Fixture::new();
        let context = fixture.context();

        let unknown_score = Rule::equals("ssn", 1.0).compile(&context).unwrap_err();
        assert!(unknown_score.contains("ssn"));
        let unknown_threshold = Rule::at_least("fname", "nope").compile(&context).unwrap_err();
        assert!(unknown_threshold.contains("nope"));
        let unknown_mask = Rule::mask("nope").compile(&context).unwrap_err();
        assert!(unknown_mask.contains("unknown mask"));

        fixture.masks.insert("a".to_string(), Rule::mask("b"));
        fixture.masks.insert("b".to_string(), Rule::any(vec![Rule::mask("a")]));
        let cycle = Rule::mask("a").compile(&fixture.context()).unwrap_err();
        assert!(cycle.contains("cycle"), "{cycle}");
    }

    #[test]
    fn masks_may_be_reused() {
        let fixture = Fixture::new();
        let rule = Rule::all(vec![Rule::mask("dob_exact"), Rule::mask("dob_exact")]);
        assert!(fixture.check(&rule, vec![0.0, 0.0, 1.0, 1.0]));
    }

    #[test]
    fn deserializes_from_json() {
        let rule: Rule = serde_json::from_str(
            r#"{"any": [
                "always",
                {"score": {"name": "fname", "op": ">=", "value": {"threshold": "review", "offset": -0.05}}},
                {"between": {"score": "byear", "low": 0.6, "high": "name_high"}},
                {"not": {"mask": "dob_exact"}}
            ]}"#,
        )
        .unwrap();

        let expected = Rule::any(vec![
            Rule::Always,
            Rule::at_least("fname", Bound::offset("review", -0.05)),
            Rule::between("byear", 0.6, "name_high"),
            Rule::not(Rule::mask("dob_exact")),
        ]);
        assert_eq!(rule, expected);
        assert_eq!(
            rule.referenced_scores().into_iter().collect::<Vec<_>>(),
            vec!["byear".to_string(), "fname".to_string()]
        );
    }
}
