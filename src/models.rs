//! Byte range bookkeeping for partially cached resources

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open byte interval `[start, end)` of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (exclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is non-empty
    /// * `Err(CacheError::InvalidRange)` if start >= end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start >= end {
            return Err(CacheError::InvalidRange(format!(
                "start ({}) must be < end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Create a range from an offset and a length
    pub fn with_len(start: u64, len: u64) -> Result<Self> {
        let end = start.checked_add(len).ok_or_else(|| {
            CacheError::InvalidRange(format!("{} + {} overflows", start, len))
        })?;
        ByteRange::new(start, end)
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True when the two ranges share a byte or sit back to back
    pub fn overlaps_or_touches(&self, other: &ByteRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True when `other` lies entirely inside this range
    pub fn contains(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection with `other`, if non-empty
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(ByteRange { start, end })
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Sorted set of disjoint, non-adjacent byte ranges
///
/// Inserting a range merges it with every neighbour it overlaps or touches,
/// so the set never holds two ranges that could be expressed as one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSet {
    ranges: Vec<ByteRange>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary (possibly overlapping) ranges
    pub fn from_ranges(ranges: impl IntoIterator<Item = ByteRange>) -> Self {
        let mut set = RangeSet::new();
        for range in ranges {
            set.insert(range);
        }
        set
    }

    /// Merge a newly observed range into the set
    ///
    /// Runs in time proportional to the number of stored ranges. Returns
    /// `true` if the set gained any byte it did not already cover.
    pub fn insert(&mut self, range: ByteRange) -> bool {
        if range.is_empty() {
            return false;
        }

        // First range that could merge with the new one
        let first = self.ranges.partition_point(|r| r.end < range.start);
        let mut last = first;
        let mut merged = range;
        while last < self.ranges.len() && self.ranges[last].start <= range.end {
            merged.start = merged.start.min(self.ranges[last].start);
            merged.end = merged.end.max(self.ranges[last].end);
            last += 1;
        }

        if last - first == 1 && self.ranges[first] == merged {
            return false;
        }

        self.ranges.splice(first..last, std::iter::once(merged));
        true
    }

    /// Drop every byte at or beyond `content_length`
    pub fn clip_to(&mut self, content_length: u64) {
        self.ranges.retain(|r| r.start < content_length);
        if let Some(last) = self.ranges.last_mut() {
            last.end = last.end.min(content_length);
        }
    }

    /// Total number of bytes covered by the set
    pub fn covered_bytes(&self) -> u64 {
        self.ranges.iter().map(ByteRange::len).sum()
    }

    /// True if every byte of `range` is in the set
    pub fn covers(&self, range: &ByteRange) -> bool {
        let idx = self.ranges.partition_point(|r| r.end <= range.start);
        self.ranges
            .get(idx)
            .map(|r| r.contains(range))
            .unwrap_or(false)
    }

    /// Gaps inside `range` that are not cached yet, in ascending order
    pub fn missing_within(&self, range: &ByteRange) -> Vec<ByteRange> {
        let mut missing = Vec::new();
        let mut cursor = range.start;
        let first = self.ranges.partition_point(|r| r.end <= range.start);

        for cached in &self.ranges[first..] {
            if cached.start >= range.end {
                break;
            }
            if cached.start > cursor {
                missing.push(ByteRange { start: cursor, end: cached.start });
            }
            cursor = cursor.max(cached.end);
        }

        if cursor < range.end {
            missing.push(ByteRange { start: cursor, end: range.end });
        }
        missing
    }

    /// True when the set is exactly `[0, content_length)`
    pub fn is_complete(&self, content_length: u64) -> bool {
        match self.ranges.as_slice() {
            [only] => only.start == 0 && only.end >= content_length,
            [] => content_length == 0,
            _ => false,
        }
    }

    pub fn as_slice(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn iter(&self) -> impl Iterator<Item = &ByteRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Check the sorted/disjoint/non-adjacent invariant
    ///
    /// Used after deserializing, since a sidecar written by an older or
    /// foreign build cannot be trusted to hold a normalized set.
    pub fn is_normalized(&self) -> bool {
        self.ranges.iter().all(|r| !r.is_empty())
            && self.ranges.windows(2).all(|w| w[0].end < w[1].start)
    }
}
