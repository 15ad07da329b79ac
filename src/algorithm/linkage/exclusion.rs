//! Records and pairs removed from later passes

use rustc_hash::FxHashSet;

use crate::models::{CandidatePair, Side};

/// Rows matched in an earlier pass, per side
///
/// In deduplication mode both sides are the same table, so a single set is
/// shared: a record matched as left is also excluded as right.
/// The set only ever grows during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    dedup: bool,
    left: FxHashSet<usize>,
    right: FxHashSet<usize>,
}

impl ExclusionSet {
    #[must_use]
    pub fn new(dedup: bool) -> Self {
        Self {
            dedup,
            ..Self::default()
        }
    }

    const fn side_for(&self, side: Side) -> Side {
        if self.dedup { Side::Left } else { side }
    }

    fn rows(&self, side: Side) -> &FxHashSet<usize> {
        match self.side_for(side) {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn insert(&mut self, side: Side, row: usize) -> bool {
        match self.side_for(side) {
            Side::Left => self.left.insert(row),
            Side::Right => self.right.insert(row),
        }
    }

    /// Exclude both records of a pair
    pub fn insert_pair(&mut self, left: usize, right: usize) {
        self.insert(Side::Left, left);
        self.insert(Side::Right, right);
    }

    #[must_use]
    pub fn contains(&self, side: Side, row: usize) -> bool {
        self.rows(side).contains(&row)
    }

    /// Whether either record of a candidate is excluded
    #[must_use]
    pub fn excludes(&self, pair: &CandidatePair) -> bool {
        self.contains(Side::Left, pair.left) || self.contains(Side::Right, pair.right)
    }

    /// Number of excluded rows on one side
    #[must_use]
    pub fn len(&self, side: Side) -> usize {
        self.rows(side).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    /// Add every exclusion of `other`
    pub fn extend(&mut self, other: &Self) {
        self.left.extend(other.left.iter().copied());
        self.right.extend(other.right.iter().copied());
    }
}

/// Row pairs that were already candidates in an earlier pass
#[derive(Debug, Clone, Default)]
pub struct SeenPairs(FxHashSet<(usize, usize)>);

impl SeenPairs {
    #[must_use]
    pub fn contains(&self, pair: &CandidatePair) -> bool {
        self.0.contains(&pair.rows())
    }

    pub fn extend<'a>(&mut self, pairs: impl IntoIterator<Item = &'a CandidatePair>) {
        self.0.extend(pairs.into_iter().map(CandidatePair::rows));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PassId;

    #[test]
    fn sides_are_separate_when_linking() {
        let mut set = ExclusionSet::new(false);
        set.insert_pair(1, 2);
        assert!(set.contains(Side::Left, 1));
        assert!(!set.contains(Side::Right, 1));
        assert!(set.contains(Side::Right, 2));
        assert!(set.excludes(&CandidatePair::new(3, 2, PassId::Blocking(0))));
        assert!(!set.excludes(&CandidatePair::new(2, 1, PassId::Blocking(0))));
    }

    #[test]
    fn dedup_shares_one_set() {
        let mut set = ExclusionSet::new(true);
        set.insert_pair(1, 2);
        assert!(set.contains(Side::Right, 1));
        assert!(set.contains(Side::Left, 2));
        assert_eq!(set.len(Side::Right), 2);
    }

    #[test]
    fn seen_pairs_track_rows() {
        let mut seen = SeenPairs::default();
        let pair = CandidatePair::new(0, 1, PassId::Blocking(0));
        seen.extend([&pair]);
        assert!(seen.contains(&CandidatePair::new(0, 1, PassId::Blocking(3))));
        assert!(!seen.contains(&CandidatePair::new(1, 0, PassId::Blocking(3))));
    }
}
