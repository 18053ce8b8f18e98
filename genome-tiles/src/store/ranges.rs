//! Bookkeeping of requested tile indices per level.

/// Sorted, merged set of half-open index ranges `[start, end)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRanges {
    ranges: Vec<(u64, u64)>,
}

impl IndexRanges {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no index has been recorded.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Record a single index.
    pub fn insert(&mut self, index: u64) {
        self.insert_range(index, index.saturating_add(1));
    }

    /// Record every index in `[start, end)`, merging touching ranges.
    pub fn insert_range(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        // first range that ends at or after `start` (touching counts)
        let first = self.ranges.partition_point(|&(_, e)| e < start);
        // first range that starts strictly after `end`
        let last = self.ranges.partition_point(|&(s, _)| s <= end);

        if first == last {
            self.ranges.insert(first, (start, end));
            return;
        }
        let merged_start = start.min(self.ranges[first].0);
        let merged_end = end.max(self.ranges[last - 1].1);
        self.ranges
            .splice(first..last, std::iter::once((merged_start, merged_end)));
    }

    /// Whether `index` has been recorded.
    pub fn contains(&self, index: u64) -> bool {
        let pos = self.ranges.partition_point(|&(_, e)| e <= index);
        self.ranges
            .get(pos)
            .is_some_and(|&(s, e)| s <= index && index < e)
    }

    /// Lowest and one-past-highest recorded index.
    pub fn bounds(&self) -> Option<(u64, u64)> {
        match (self.ranges.first(), self.ranges.last()) {
            (Some(&(start, _)), Some(&(_, end))) => Some((start, end)),
            _ => None,
        }
    }

    /// Total number of recorded indices.
    pub fn count(&self) -> u64 {
        self.ranges.iter().map(|&(s, e)| e - s).sum()
    }

    /// Iterate the merged ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.ranges.iter().copied()
    }
}
