//! # index_set
//!
//! why: track sparse collections of log indices without storing every index
//! relations: used by raft-storage journal recovery to detect gaps, usable anywhere indices are tracked
//! what: IndexRange, MutableIndexSet (coalescing insert), ImmutableIndexSet (shared/serialized form)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A closed range `[lower, upper]` of unsigned indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexRange {
    pub lower: u64,
    pub upper: u64,
}

impl IndexRange {
    /// Panics if `lower > upper`, which would be an empty range.
    pub fn new(lower: u64, upper: u64) -> Self {
        assert!(lower <= upper, "invalid range [{lower}, {upper}]");
        Self { lower, upper }
    }

    pub fn single(index: u64) -> Self {
        Self {
            lower: index,
            upper: index,
        }
    }

    pub fn contains(&self, index: u64) -> bool {
        self.lower <= index && index <= self.upper
    }

    /// Number of indices covered; u128 because `[0, u64::MAX]` holds 2^64 of them
    pub fn len(&self) -> u128 {
        u128::from(self.upper - self.lower) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lower == self.upper {
            write!(f, "{}", self.lower)
        } else {
            write!(f, "{}..={}", self.lower, self.upper)
        }
    }
}

/// true when `prev` ends right before or inside `next`
fn touches(prev_upper: u64, next_lower: u64) -> bool {
    prev_upper.checked_add(1).map_or(true, |after| after >= next_lower)
}

// -- mutable variant --

/// Growable index set; inserts coalesce overlapping and adjacent ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutableIndexSet {
    // lower -> upper, never two ranges touching
    ranges: BTreeMap<u64, u64>,
}

impl MutableIndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single index, returning true if it was not present before
    pub fn add(&mut self, index: u64) -> bool {
        if self.contains(index) {
            return false;
        }
        self.add_range(IndexRange::single(index));
        true
    }

    /// Insert every index of `range`, merging with whatever it overlaps or abuts
    pub fn add_range(&mut self, range: IndexRange) {
        let mut lower = range.lower;
        let mut upper = range.upper;

        if let Some((&prev_lower, &prev_upper)) = self.ranges.range(..=lower).next_back() {
            if touches(prev_upper, lower) {
                lower = prev_lower;
                upper = upper.max(prev_upper);
                self.ranges.remove(&prev_lower);
            }
        }

        let absorbed: Vec<(u64, u64)> = self
            .ranges
            .range(lower..)
            .take_while(|(&next_lower, _)| touches(upper, next_lower))
            .map(|(&l, &u)| (l, u))
            .collect();
        for (next_lower, next_upper) in absorbed {
            upper = upper.max(next_upper);
            self.ranges.remove(&next_lower);
        }

        self.ranges.insert(lower, upper);
    }

    /// Merge all ranges of `other` into this set
    pub fn add_all(&mut self, other: &MutableIndexSet) {
        for range in other.ranges() {
            self.add_range(range);
        }
    }

    pub fn contains(&self, index: u64) -> bool {
        self.ranges
            .range(..=index)
            .next_back()
            .map_or(false, |(_, &upper)| index <= upper)
    }

    pub fn ranges(&self) -> impl Iterator<Item = IndexRange> + '_ {
        self.ranges
            .iter()
            .map(|(&lower, &upper)| IndexRange { lower, upper })
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Total number of indices in the set
    pub fn len(&self) -> u128 {
        self.ranges().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn first(&self) -> Option<u64> {
        self.ranges.keys().next().copied()
    }

    pub fn last(&self) -> Option<u64> {
        self.ranges.values().next_back().copied()
    }

    pub fn immutable_copy(&self) -> ImmutableIndexSet {
        ImmutableIndexSet {
            ranges: self.ranges().collect::<Vec<_>>().into(),
        }
    }
}

impl FromIterator<u64> for MutableIndexSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut set = Self::new();
        for index in iter {
            set.add(index);
        }
        set
    }
}

impl fmt::Display for MutableIndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_ranges(f, self.ranges())
    }
}

// -- immutable variant --

/// Frozen index set, cheap to clone and share
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<IndexRange>", into = "Vec<IndexRange>")]
pub struct ImmutableIndexSet {
    ranges: Arc<[IndexRange]>,
}

impl ImmutableIndexSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: u64) -> bool {
        match self.ranges.binary_search_by(|r| r.lower.cmp(&index)) {
            Ok(_) => true,
            Err(0) => false,
            Err(pos) => self.ranges[pos - 1].contains(index),
        }
    }

    pub fn ranges(&self) -> &[IndexRange] {
        &self.ranges
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn len(&self) -> u128 {
        self.ranges.iter().map(IndexRange::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn mutable_copy(&self) -> MutableIndexSet {
        MutableIndexSet {
            ranges: self.ranges.iter().map(|r| (r.lower, r.upper)).collect(),
        }
    }
}

impl TryFrom<Vec<IndexRange>> for ImmutableIndexSet {
    type Error = String;

    /// Accepts only the canonical form: sorted, disjoint, non-adjacent ranges
    fn try_from(ranges: Vec<IndexRange>) -> Result<Self, Self::Error> {
        for range in &ranges {
            if range.lower > range.upper {
                return Err(format!("inverted range {}..={}", range.lower, range.upper));
            }
        }
        for pair in ranges.windows(2) {
            if touches(pair[0].upper, pair[1].lower) {
                return Err(format!("ranges {} and {} are not disjoint", pair[0], pair[1]));
            }
        }
        Ok(Self {
            ranges: ranges.into(),
        })
    }
}

impl From<ImmutableIndexSet> for Vec<IndexRange> {
    fn from(set: ImmutableIndexSet) -> Self {
        set.ranges.to_vec()
    }
}

impl fmt::Display for ImmutableIndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_ranges(f, self.ranges.iter().copied())
    }
}

fn write_ranges(f: &mut fmt::Formatter<'_>, ranges: impl Iterator<Item = IndexRange>) -> fmt::Result {
    write!(f, "[")?;
    for (i, range) in ranges.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{range}")?;
    }
    write!(f, "]")
}
