//! Common type definitions
//!
//! This module contains the small enum types shared by every stage of the
//! linkage pipeline: strictness tiers, table sides and pass identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

/// Strictness level at which a pair can be accepted
///
/// The declaration order is the evaluation order and the strength order:
/// `Strict < Moderate < Relaxed < Review`, where "less" means stricter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Highest confidence matches
    Strict,
    /// Medium confidence matches
    Moderate,
    /// Lowest confidence matches
    Relaxed,
    /// Pairs flagged for clerical review
    Review,
}

impl Tier {
    /// All tiers in evaluation order
    pub const ALL: [Self; 4] = [Self::Strict, Self::Moderate, Self::Relaxed, Self::Review];

    /// Name used in configuration files and output column names
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Moderate => "moderate",
            Self::Relaxed => "relaxed",
            Self::Review => "review",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Whether this tier is at least as strict as `other`
    #[must_use]
    pub fn is_at_least(self, other: Self) -> bool {
        self <= other
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "moderate" => Ok(Self::Moderate),
            "relaxed" => Ok(Self::Relaxed),
            "review" => Ok(Self::Review),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// Set of tiers at which a single pair was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TierSet(u8);

impl TierSet {
    /// Empty set
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Set containing every tier
    #[must_use]
    pub const fn all() -> Self {
        Self(0b1111)
    }

    pub fn insert(&mut self, tier: Tier) {
        self.0 |= tier.bit();
    }

    #[must_use]
    pub const fn contains(self, tier: Tier) -> bool {
        self.0 & tier.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Tiers in the set, strictest first
    pub fn iter(self) -> impl Iterator<Item = Tier> {
        Tier::ALL.into_iter().filter(move |tier| self.contains(*tier))
    }

    /// The strictest tier in the set
    #[must_use]
    pub fn strongest(self) -> Option<Tier> {
        self.iter().next()
    }

    /// Whether the pair belongs to the `tier` partition under union semantics,
    /// i.e. it was accepted at `tier` or at any stricter tier.
    #[must_use]
    pub fn reaches(self, tier: Tier) -> bool {
        self.strongest().is_some_and(|strongest| strongest.is_at_least(tier))
    }
}

impl FromIterator<Tier> for TierSet {
    fn from_iter<I: IntoIterator<Item = Tier>>(iter: I) -> Self {
        let mut set = Self::empty();
        for tier in iter {
            set.insert(tier);
        }
        set
    }
}

/// One of the two tables being linked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

/// Identifies a pass within a linkage run
///
/// Ground-truth passes run before all blocking passes, so the derived
/// ordering puts them first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassId {
    /// Pre-pass over the n-th ground-truth identifier
    GroundTruth(usize),
    /// Regular blocking pass with the given index
    Blocking(usize),
}

impl PassId {
    #[must_use]
    pub const fn is_ground_truth(self) -> bool {
        matches!(self, Self::GroundTruth(_))
    }

    /// Index of a blocking pass, `None` for ground-truth passes
    #[must_use]
    pub const fn blocking_index(self) -> Option<usize> {
        match self {
            Self::Blocking(index) => Some(index),
            Self::GroundTruth(_) => None,
        }
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GroundTruth(index) => write!(f, "dup_{index}"),
            Self::Blocking(index) => write!(f, "{index}"),
        }
    }
}

impl Serialize for PassId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_order_is_strength_order() {
        assert!(Tier::Strict.is_at_least(Tier::Moderate));
        assert!(Tier::Moderate.is_at_least(Tier::Moderate));
        assert!(!Tier::Review.is_at_least(Tier::Relaxed));
        assert_eq!("Relaxed".parse::<Tier>(), Ok(Tier::Relaxed));
    }

    #[test]
    fn tier_set_tracks_strongest_tier() {
        let set: TierSet = [Tier::Review, Tier::Moderate].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.strongest(), Some(Tier::Moderate));
        assert!(set.reaches(Tier::Relaxed));
        assert!(!set.reaches(Tier::Strict));
        assert!(TierSet::empty().strongest().is_none());
        assert_eq!(TierSet::all().iter().collect::<Vec<_>>(), Tier::ALL.to_vec());
    }

    #[test]
    fn ground_truth_passes_sort_first() {
        let mut passes = vec![PassId::Blocking(1), PassId::GroundTruth(0), PassId::Blocking(0)];
        passes.sort();
        assert_eq!(
            passes,
            vec![PassId::GroundTruth(0), PassId::Blocking(0), PassId::Blocking(1)]
        );
        assert_eq!(PassId::GroundTruth(2).to_string(), "dup_2");
    }
}
