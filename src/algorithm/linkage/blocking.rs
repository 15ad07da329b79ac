//! Blocking engine
//!
//! Narrows the cross product of the two tables to candidate pairs that agree
//! exactly on every blocking field. Right-side records are indexed by their
//! composite key and left-side records probe the index.

use std::borrow::Cow;

use log::debug;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::algorithm::linkage::exclusion::{ExclusionSet, SeenPairs};
use crate::config::INVERTED_SUFFIX;
use crate::error::Result;
use crate::models::{CandidatePair, PassId, Record, Side, TablePair};

type KeyValues<'a> = SmallVec<[Cow<'a, str>; 4]>;

/// Resolved blocking fields of one pass
///
/// `left[i]` on the left table must equal `right[i]` on the right table.
/// Fields written with the `_inv` suffix are compared crosswise: the
/// inverted fields of a pass are paired with the same fields in reverse
/// order, so `[xf_inv, xl_inv]` means `left.xf == right.xl` and
/// `left.xl == right.xf`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockingKey {
    names: Vec<String>,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl BlockingKey {
    /// Resolve blocking field names against both tables
    ///
    /// # Errors
    ///
    /// [`crate::error::LinkageError::UnknownField`] when a field is missing
    /// from either table.
    pub fn resolve(fields: &[String], tables: TablePair<'_>, context: &str) -> Result<Self> {
        let mut straight = Vec::new();
        let mut inverted = Vec::new();
        for field in fields {
            match field.strip_suffix(INVERTED_SUFFIX) {
                Some(base) => inverted.push(base),
                None => straight.push(field.as_str()),
            }
        }

        let mut left = Vec::with_capacity(fields.len());
        let mut right = Vec::with_capacity(fields.len());
        for field in &straight {
            left.push(tables.left.require_field(context, field)?);
            right.push(tables.right.require_field(context, field)?);
        }
        for (field, swapped) in inverted.iter().zip(inverted.iter().rev()) {
            left.push(tables.left.require_field(context, field)?);
            right.push(tables.right.require_field(context, swapped)?);
        }

        Ok(Self {
            names: fields.to_vec(),
            left,
            right,
        })
    }

    /// Configured field names, suffixes included
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    fn values<'a>(&self, record: &'a Record, side: Side) -> Option<KeyValues<'a>> {
        let fields = match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        };
        fields
            .iter()
            .map(|&field| record.value(field).as_text())
            .collect()
    }
}

/// Produce the candidate pairs of one pass
///
/// Excluded records never take part. A missing blocking value never matches.
/// An empty key crosses every remaining record. In deduplication mode each
/// unordered pair is emitted once as `(lower row, higher row)` and no record
/// is paired with itself. Pairs in `seen` are left out. The result is sorted
/// by row pair.
#[must_use]
pub fn block(
    tables: TablePair<'_>,
    key: &BlockingKey,
    exclusions: &ExclusionSet,
    pass: PassId,
    seen: Option<&SeenPairs>,
) -> Vec<CandidatePair> {
    let left_rows: Vec<usize> = (0..tables.left.len())
        .filter(|&row| !exclusions.contains(Side::Left, row))
        .collect();
    let right_rows: Vec<usize> = (0..tables.right.len())
        .filter(|&row| !exclusions.contains(Side::Right, row))
        .collect();

    let mut pairs = if key.is_empty() {
        cross(&left_rows, &right_rows, tables.dedup, pass)
    } else {
        hash_join(tables, key, &left_rows, &right_rows, pass)
    };

    if let Some(seen) = seen {
        pairs.retain(|pair| !seen.contains(pair));
    }

    debug!(
        "Pass {pass}: {} candidate pairs from {} left and {} right records",
        pairs.len(),
        left_rows.len(),
        right_rows.len()
    );
    pairs
}

fn cross(left_rows: &[usize], right_rows: &[usize], dedup: bool, pass: PassId) -> Vec<CandidatePair> {
    left_rows
        .iter()
        .flat_map(|&left| {
            right_rows
                .iter()
                .filter(move |&&right| !dedup || left < right)
                .map(move |&right| CandidatePair::new(left, right, pass))
        })
        .collect()
}

fn hash_join(
    tables: TablePair<'_>,
    key: &BlockingKey,
    left_rows: &[usize],
    right_rows: &[usize],
    pass: PassId,
) -> Vec<CandidatePair> {
    let mut index: FxHashMap<KeyValues<'_>, Vec<usize>> = FxHashMap::default();
    for &row in right_rows {
        if let Some(values) = key.values(tables.right.record(row), Side::Right) {
            index.entry(values).or_default().push(row);
        }
    }

    let mut pairs = Vec::new();
    for &left in left_rows {
        let Some(values) = key.values(tables.left.record(left), Side::Left) else {
            continue;
        };
        let Some(matches) = index.get(&values) else {
            continue;
        };
        for &right in matches {
            if !tables.dedup {
                pairs.push(CandidatePair::new(left, right, pass));
            } else if left != right {
                pairs.push(CandidatePair::new(left.min(right), left.max(right), pass));
            }
        }
    }

    pairs.sort_unstable();
    pairs.dedup();
    pairs
}
