//! Cardinality resolution
//!
//! Turns the accepted pairs of all passes into the final per-tier result
//! sets. Partitions use union semantics: the partition of tier `T` holds
//! every pair whose strongest accepting tier is `T` or stricter.
//!
//! Under a constraining cardinality, pairs are walked in rank order and a
//! pair wins when none of its constrained records has already been claimed.
//! Losing pairs are kept as [`SupersededPair`]s together with the reason.

use std::cmp::Ordering;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::models::{AcceptedPair, PassId, Side, Tier};

/// How many partners a record may keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Each left and each right record keeps at most one partner
    OneToOne,
    /// A left record may repeat across pairs, a right record keeps one partner
    ///
    /// Use [`Cardinality::ManyToOne`] to let right records repeat instead.
    OneToMany,
    /// A right record may repeat across pairs, a left record keeps one partner
    ///
    /// Use [`Cardinality::OneToMany`] to let left records repeat instead.
    ManyToOne,
    /// Every accepted pair is kept
    #[default]
    ManyToMany,
}

impl Cardinality {
    /// Whether records of `side` may keep at most one partner
    #[must_use]
    pub const fn constrains(self, side: Side) -> bool {
        matches!(
            (self, side),
            (Self::OneToOne, _) | (Self::OneToMany, Side::Right) | (Self::ManyToOne, Side::Left)
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::ManyToMany => "many_to_many",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which competing pairs are considered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    /// Highest aggregate similarity first, then earliest pass
    #[default]
    ScoreThenPass,
    /// Earliest pass first, then highest aggregate similarity
    PassThenScore,
}

/// What happens when equally ranked pairs claim the same record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The pair with the smaller left id, then right id, wins
    #[default]
    StableIds,
    /// All tied pairs lose and the contested record stays unmatched
    SupersedeAll,
}

/// Deterministic policy for cardinality conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictPolicy {
    pub rank: RankOrder,
    pub on_tie: TieBreak,
    /// Rank pairs accepted at a stricter tier ahead of the rest
    pub tier_first: bool,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            rank: RankOrder::ScoreThenPass,
            on_tie: TieBreak::StableIds,
            tier_first: true,
        }
    }
}

/// A pair in a resolved partition
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPair {
    pub left_id: String,
    pub right_id: String,
    pub pass: PassId,
    /// Strongest tier the pair was accepted at
    pub tier: Tier,
    /// Aggregate similarity
    pub score: f64,
}

impl MatchedPair {
    fn from_accepted(pair: &AcceptedPair, tier: Tier) -> Self {
        Self {
            left_id: pair.left_id.clone(),
            right_id: pair.right_id.clone(),
            pass: pair.pass,
            tier,
            score: pair.score(),
        }
    }

    #[must_use]
    pub fn id(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_id,
            Side::Right => &self.right_id,
        }
    }

    fn ids(&self) -> (&str, &str) {
        (&self.left_id, &self.right_id)
    }
}

/// Why a pair was removed from a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupersedeReason {
    /// A better ranked pair already holds the record
    Claimed {
        side: Side,
        record_id: String,
        winner_left: String,
        winner_right: String,
    },
    /// Equally ranked pairs competed for the record
    Tied { side: Side, record_id: String },
}

impl fmt::Display for SupersedeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claimed {
                side,
                record_id,
                winner_left,
                winner_right,
            } => write!(
                f,
                "{side} record {record_id} claimed by ({winner_left}, {winner_right})"
            ),
            Self::Tied { side, record_id } => {
                write!(f, "{side} record {record_id} contested by tied pairs")
            }
        }
    }
}

/// A pair removed by cardinality resolution
#[derive(Debug, Clone, PartialEq)]
pub struct SupersededPair {
    pub pair: MatchedPair,
    pub reason: SupersedeReason,
}

/// Resolved pairs of one tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierPartition {
    pub tier: Tier,
    pub matches: Vec<MatchedPair>,
    pub superseded: Vec<SupersededPair>,
}

/// Final result of a linkage run, one partition per tier
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResultSet {
    cardinality: Cardinality,
    partitions: Vec<TierPartition>,
}

impl MatchResultSet {
    #[must_use]
    pub const fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    #[must_use]
    pub fn partition(&self, tier: Tier) -> &TierPartition {
        &self.partitions[tier as usize]
    }

    #[must_use]
    pub fn matches(&self, tier: Tier) -> &[MatchedPair] {
        &self.partition(tier).matches
    }

    #[must_use]
    pub fn superseded(&self, tier: Tier) -> &[SupersededPair] {
        &self.partition(tier).superseded
    }

    /// Partitions, strictest first
    pub fn partitions(&self) -> impl Iterator<Item = &TierPartition> {
        self.partitions.iter()
    }

    /// Whether `(left_id, right_id)` is a match at `tier`
    #[must_use]
    pub fn contains(&self, tier: Tier, left_id: &str, right_id: &str) -> bool {
        self.matches(tier)
            .iter()
            .any(|pair| pair.left_id == left_id && pair.right_id == right_id)
    }
}

/// Resolve accepted pairs into per-tier result sets
///
/// # Arguments
///
/// * `accepted` - Pairs accepted in any pass, at one or more tiers
/// * `cardinality` - Which sides may keep only one partner
/// * `policy` - Rank order and tie handling for conflicts
#[must_use]
pub fn resolve(accepted: &[AcceptedPair], cardinality: Cardinality, policy: &ConflictPolicy) -> MatchResultSet {
    resolve_records(accepted, cardinality, policy, false)
}

/// Resolve the accepted pairs of a deduplication run
///
/// Both sides of a pair come from the same table, so a record is claimed by
/// id whichever side of the pair it sits on.
#[must_use]
pub fn resolve_dedup(
    accepted: &[AcceptedPair],
    cardinality: Cardinality,
    policy: &ConflictPolicy,
) -> MatchResultSet {
    resolve_records(accepted, cardinality, policy, true)
}

fn resolve_records(
    accepted: &[AcceptedPair],
    cardinality: Cardinality,
    policy: &ConflictPolicy,
    dedup: bool,
) -> MatchResultSet {
    let partitions = Tier::ALL
        .into_iter()
        .map(|tier| resolve_tier(accepted, tier, cardinality, policy, dedup))
        .collect();
    MatchResultSet {
        cardinality,
        partitions,
    }
}

fn resolve_tier(
    accepted: &[AcceptedPair],
    tier: Tier,
    cardinality: Cardinality,
    policy: &ConflictPolicy,
    dedup: bool,
) -> TierPartition {
    let mut ranked: Vec<MatchedPair> = accepted
        .iter()
        .filter(|pair| pair.tiers.reaches(tier))
        .filter_map(|pair| {
            pair.strongest_tier()
                .map(|strongest| MatchedPair::from_accepted(pair, strongest))
        })
        .collect();
    ranked.sort_by(|a, b| compare_rank(a, b, policy).then_with(|| a.ids().cmp(&b.ids())));

    // The same pair may be accepted again in a later pass when the exclusion
    // tier is stricter than its acceptance; keep its best ranked occurrence.
    let mut seen = FxHashSet::default();
    ranked.retain(|pair| seen.insert((pair.left_id.clone(), pair.right_id.clone())));

    let (mut matches, mut superseded) = if cardinality == Cardinality::ManyToMany {
        (ranked, Vec::new())
    } else {
        Claims::new(cardinality, policy.on_tie, dedup).walk(ranked, policy)
    };

    matches.sort_by(|a, b| a.ids().cmp(&b.ids()));
    superseded.sort_by(|a, b| a.pair.ids().cmp(&b.pair.ids()));

    TierPartition {
        tier,
        matches,
        superseded,
    }
}

/// Rank order without the id tie-break; `Equal` means tied
fn compare_rank(a: &MatchedPair, b: &MatchedPair, policy: &ConflictPolicy) -> Ordering {
    let ground_truth = b.pass.is_ground_truth().cmp(&a.pass.is_ground_truth());
    let tier = if policy.tier_first {
        a.tier.cmp(&b.tier)
    } else {
        Ordering::Equal
    };
    let score = b.score.total_cmp(&a.score);
    let pass = a.pass.cmp(&b.pass);
    let order = match policy.rank {
        RankOrder::ScoreThenPass => score.then(pass),
        RankOrder::PassThenScore => pass.then(score),
    };
    ground_truth.then(tier).then(order)
}

enum Holder {
    Pair(String, String),
    Contested,
}

struct Claims {
    cardinality: Cardinality,
    on_tie: TieBreak,
    dedup: bool,
    holders: FxHashMap<(Side, String), Holder>,
}

impl Claims {
    fn new(cardinality: Cardinality, on_tie: TieBreak, dedup: bool) -> Self {
        Self {
            cardinality,
            on_tie,
            dedup,
            holders: FxHashMap::default(),
        }
    }

    /// Side a record is held under; deduplication holds both sides together
    const fn held_side(&self, side: Side) -> Side {
        if self.dedup {
            Side::Left
        } else {
            side
        }
    }

    fn constrained_sides(&self) -> impl Iterator<Item = Side> + '_ {
        [Side::Left, Side::Right]
            .into_iter()
            .filter(|side| self.cardinality.constrains(*side))
    }

    /// First constrained record of `pair` that is already held
    fn blocked(&self, pair: &MatchedPair) -> Option<SupersedeReason> {
        self.constrained_sides().find_map(|side| {
            let record_id = pair.id(side).to_string();
            match self.holders.get(&(self.held_side(side), record_id.clone()))? {
                Holder::Pair(winner_left, winner_right) => Some(SupersedeReason::Claimed {
                    side,
                    record_id,
                    winner_left: winner_left.clone(),
                    winner_right: winner_right.clone(),
                }),
                Holder::Contested => Some(SupersedeReason::Tied { side, record_id }),
            }
        })
    }

    fn claim(&mut self, pair: &MatchedPair) {
        let sides: Vec<Side> = self.constrained_sides().collect();
        for side in sides {
            self.holders.insert(
                (self.held_side(side), pair.id(side).to_string()),
                Holder::Pair(pair.left_id.clone(), pair.right_id.clone()),
            );
        }
    }

    fn walk(
        mut self,
        ranked: Vec<MatchedPair>,
        policy: &ConflictPolicy,
    ) -> (Vec<MatchedPair>, Vec<SupersededPair>) {
        let mut matches = Vec::new();
        let mut superseded = Vec::new();

        let mut pairs = ranked.into_iter().peekable();
        while let Some(first) = pairs.next() {
            let mut group = vec![first];
            while let Some(next) = pairs.next_if(|next| compare_rank(&group[0], next, policy).is_eq()) {
                group.push(next);
            }
            self.resolve_group(group, &mut matches, &mut superseded);
        }

        (matches, superseded)
    }

    /// Resolve pairs of equal rank; `group` is sorted by ids
    fn resolve_group(
        &mut self,
        group: Vec<MatchedPair>,
        matches: &mut Vec<MatchedPair>,
        superseded: &mut Vec<SupersededPair>,
    ) {
        let mut open = Vec::with_capacity(group.len());
        for pair in group {
            match self.blocked(&pair) {
                Some(reason) => superseded.push(SupersededPair { pair, reason }),
                None => open.push(pair),
            }
        }

        match self.on_tie {
            TieBreak::StableIds => {
                for pair in open {
                    match self.blocked(&pair) {
                        Some(reason) => superseded.push(SupersededPair { pair, reason }),
                        None => {
                            self.claim(&pair);
                            matches.push(pair);
                        }
                    }
                }
            }
            TieBreak::SupersedeAll => {
                let mut counts: FxHashMap<(Side, &str), usize> = FxHashMap::default();
                for pair in &open {
                    for side in self.constrained_sides() {
                        *counts.entry((self.held_side(side), pair.id(side))).or_default() += 1;
                    }
                }
                let contested: Vec<(Side, String)> = counts
                    .into_iter()
                    .filter(|(_, count)| *count > 1)
                    .map(|((side, id), _)| (side, id.to_string()))
                    .collect();

                let mut winners = Vec::new();
                for pair in open {
                    let tied = self
                        .constrained_sides()
                        .find(|side| {
                            let held = self.held_side(*side);
                            contested.iter().any(|(s, id)| *s == held && id == pair.id(*side))
                        });
                    match tied {
                        Some(side) => {
                            let record_id = pair.id(side).to_string();
                            superseded.push(SupersededPair {
                                pair,
                                reason: SupersedeReason::Tied { side, record_id },
                            });
                        }
                        None => winners.push(pair),
                    }
                }

                for key in contested {
                    self.holders.insert(key, Holder::Contested);
                }
                for pair in winners {
                    self.claim(&pair);
                    matches.push(pair);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TierSet;

    fn pair(left: &str, right: &str, pass: usize, tiers: &[Tier], scores: Vec<f64>) -> AcceptedPair {
        AcceptedPair {
            left_id: left.to_string(),
            right_id: right.to_string(),
            left_row: 0,
            right_row: 0,
            pass: PassId::Blocking(pass),
            tiers: tiers.iter().copied().collect::<TierSet>(),
            scores: scores.into(),
        }
    }

    fn ids(pairs: &[MatchedPair]) -> Vec<(&str, &str)> {
        pairs.iter().map(|p| (p.left_id.as_str(), p.right_id.as_str())).collect()
    }

    #[test]
    fn partitions_use_union_semantics() {
        let accepted = vec![
            pair("a1", "b1", 0, &[Tier::Strict], vec![1.0]),
            pair("a2", "b2", 0, &[Tier::Relaxed, Tier::Review], vec![0.5]),
        ];
        let result = resolve(&accepted, Cardinality::ManyToMany, &ConflictPolicy::default());

        assert_eq!(ids(result.matches(Tier::Strict)), vec![("a1", "b1")]);
        assert_eq!(ids(result.matches(Tier::Moderate)), vec![("a1", "b1")]);
        assert_eq!(ids(result.matches(Tier::Relaxed)), vec![("a1", "b1"), ("a2", "b2")]);
        assert_eq!(result.matches(Tier::Review).len(), 2);
        assert_eq!(result.matches(Tier::Review)[1].tier, Tier::Relaxed);
    }

    #[test]
    fn one_to_one_prefers_higher_score() {
        let accepted = vec![
            pair("a1", "b1", 0, &[Tier::Strict], vec![0.9]),
            pair("a1", "b2", 0, &[Tier::Strict], vec![0.95]),
            pair("a2", "b1", 1, &[Tier::Strict], vec![0.99]),
        ];
        let result = resolve(&accepted, Cardinality::OneToOne, &ConflictPolicy::default());

        // (a2, b1) ranks first, then (a1, b2); (a1, b1) loses both records.
        assert_eq!(ids(result.matches(Tier::Strict)), vec![("a1", "b2"), ("a2", "b1")]);
        let lost = &result.superseded(Tier::Strict)[0];
        assert_eq!(lost.pair.left_id, "a1");
        assert!(matches!(
            &lost.reason,
            SupersedeReason::Claimed { side: Side::Left, winner_right, .. } if winner_right == "b2"
        ));
    }

    #[test]
    fn pass_then_score_prefers_earlier_pass() {
        let accepted = vec![
            pair("a1", "b1", 0, &[Tier::Strict], vec![0.5]),
            pair("a1", "b2", 1, &[Tier::Strict], vec![1.0, 1.0]),
        ];
        let policy = ConflictPolicy {
            rank: RankOrder::PassThenScore,
            ..ConflictPolicy::default()
        };
        let result = resolve(&accepted, Cardinality::OneToOne, &policy);
        assert_eq!(ids(result.matches(Tier::Strict)), vec![("a1", "b1")]);

        let by_score = resolve(&accepted, Cardinality::OneToOne, &ConflictPolicy::default());
        assert_eq!(ids(by_score.matches(Tier::Strict)), vec![("a1", "b2")]);
    }

    #[test]
    fn tier_first_outranks_score() {
        let accepted = vec![
            pair("a1", "b1", 0, &[Tier::Strict], vec![0.5]),
            pair("a1", "b2", 0, &[Tier::Moderate], vec![1.0]),
        ];
        let result = resolve(&accepted, Cardinality::OneToOne, &ConflictPolicy::default());
        assert_eq!(ids(result.matches(Tier::Moderate)), vec![("a1", "b1")]);

        let flat = ConflictPolicy {
            tier_first: false,
            ..ConflictPolicy::default()
        };
        let result = resolve(&accepted, Cardinality::OneToOne, &flat);
        assert_eq!(ids(result.matches(Tier::Moderate)), vec![("a1", "b2")]);
    }

    #[test]
    fn one_sided_cardinalities() {
        let accepted = vec![
            pair("a1", "b1", 0, &[Tier::Strict], vec![1.0]),
            pair("a1", "b2", 0, &[Tier::Strict], vec![0.9]),
            pair("a2", "b2", 0, &[Tier::Strict], vec![0.8]),
        ];
        let policy = ConflictPolicy::default();

        // Left may repeat, each right record keeps one partner.
        let one_to_many = resolve(&accepted, Cardinality::OneToMany, &policy);
        assert_eq!(
            ids(one_to_many.matches(Tier::Strict)),
            vec![("a1", "b1"), ("a1", "b2")]
        );

        // Right may repeat, each left record keeps one partner.
        let many_to_one = resolve(&accepted, Cardinality::ManyToOne, &policy);
        assert_eq!(
            ids(many_to_one.matches(Tier::Strict)),
            vec![("a1", "b1"), ("a2", "b2")]
        );
    }

    #[test]
    fn ties_follow_policy() {
        let accepted = vec![
            pair("a1", "b1", 0, &[Tier::Strict], vec![0.9]),
            pair("a1", "b2", 0, &[Tier::Strict], vec![0.9]),
            pair("a1", "b3", 0, &[Tier::Strict], vec![0.5]),
            pair("a2", "b3", 0, &[Tier::Strict], vec![0.4]),
        ];

        let stable = resolve(&accepted, Cardinality::OneToOne, &ConflictPolicy::default());
        assert_eq!(ids(stable.matches(Tier::Strict)), vec![("a1", "b1"), ("a2", "b3")]);

        let strict_ties = ConflictPolicy {
            on_tie: TieBreak::SupersedeAll,
            ..ConflictPolicy::default()
        };
        let result = resolve(&accepted, Cardinality::OneToOne, &strict_ties);
        // a1 is contested, so none of its pairs survive; b3 stays free for a2.
        assert_eq!(ids(result.matches(Tier::Strict)), vec![("a2", "b3")]);
        assert_eq!(result.superseded(Tier::Strict).len(), 3);
        assert!(result
            .superseded(Tier::Strict)
            .iter()
            .all(|lost| matches!(&lost.reason, SupersedeReason::Tied { record_id, .. } if record_id == "a1")));
    }

    #[test]
    fn ground_truth_pairs_rank_first() {
        let mut known = pair("a1", "b1", 0, &Tier::ALL, vec![]);
        known.pass = PassId::GroundTruth(0);
        let accepted = vec![known, pair("a1", "b2", 0, &[Tier::Strict], vec![1.0, 1.0])];
        let result = resolve(&accepted, Cardinality::OneToOne, &ConflictPolicy::default());
        assert_eq!(ids(result.matches(Tier::Strict)), vec![("a1", "b1")]);
    }

    #[test]
    fn repeated_pairs_are_collapsed() {
        let accepted = vec![
            pair("a1", "b1", 0, &[Tier::Review], vec![0.7]),
            pair("a1", "b1", 1, &[Tier::Strict], vec![0.9]),
        ];
        let result = resolve(&accepted, Cardinality::OneToOne, &ConflictPolicy::default());
        assert_eq!(result.matches(Tier::Review).len(), 1);
        assert_eq!(result.matches(Tier::Review)[0].tier, Tier::Strict);
        assert!(result.superseded(Tier::Review).is_empty());
    }

    #[test]
    fn one_sided_cardinalities_name_the_repeating_side() {
        assert!(!Cardinality::OneToMany.constrains(Side::Left));
        assert!(Cardinality::OneToMany.constrains(Side::Right));
        assert!(Cardinality::ManyToOne.constrains(Side::Left));
        assert!(!Cardinality::ManyToOne.constrains(Side::Right));
        assert!(Cardinality::OneToOne.constrains(Side::Left) && Cardinality::OneToOne.constrains(Side::Right));
    }

    #[test]
    fn dedup_claims_records_on_either_side() {
        let accepted = vec![
            pair("p0", "p1", 0, &[Tier::Strict], vec![0.9]),
            pair("p1", "p2", 0, &[Tier::Strict], vec![0.8]),
        ];

        let linked = resolve(&accepted, Cardinality::OneToOne, &ConflictPolicy::default());
        assert_eq!(linked.matches(Tier::Strict).len(), 2);

        let result = resolve_dedup(&accepted, Cardinality::OneToOne, &ConflictPolicy::default());
        assert_eq!(ids(result.matches(Tier::Strict)), vec![("p0", "p1")]);
        assert_eq!(
            result.superseded(Tier::Strict)[0].reason,
            SupersedeReason::Claimed {
                side: Side::Left,
                record_id: "p1".to_string(),
                winner_left: "p0".to_string(),
                winner_right: "p1".to_string(),
            }
        );
    }

    #[test]
    fn dedup_ties_contest_records_on_either_side() {
        let accepted = vec![
            pair("p0", "p1", 0, &[Tier::Strict], vec![0.9]),
            pair("p1", "p2", 0, &[Tier::Strict], vec![0.9]),
        ];
        let strict_ties = ConflictPolicy {
            on_tie: TieBreak::SupersedeAll,
            ..ConflictPolicy::default()
        };
        let result = resolve_dedup(&accepted, Cardinality::OneToOne, &strict_ties);
        assert!(result.matches(Tier::Strict).is_empty());
        assert!(result
            .superseded(Tier::Strict)
            .iter()
            .all(|lost| matches!(&lost.reason, SupersedeReason::Tied { record_id, .. } if record_id == "p1")));
    }
}
