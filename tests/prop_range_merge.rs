// Property: merging byte ranges in any order produces a sorted,
// non-overlapping, non-adjacent set that covers exactly the union of the
// inserted ranges, and never exceeds the content length once clipped.

use media_range_cache::{ByteRange, RangeSet};
use proptest::prelude::*;

const SPAN: u64 = 512;

fn arb_range() -> impl Strategy<Value = ByteRange> {
    (0..SPAN, 1..64u64).prop_map(|(start, len)| ByteRange::new(start, start + len).unwrap())
}

/// Brute-force coverage of `[0, SPAN + 64)`
fn coverage(ranges: &[ByteRange]) -> Vec<bool> {
    let mut covered = vec![false; (SPAN + 64) as usize];
    for r in ranges {
        for b in r.start..r.end {
            covered[b as usize] = true;
        }
    }
    covered
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The merged set stays normalized and covers exactly the union
    #[test]
    fn prop_merge_matches_union(ranges in prop::collection::vec(arb_range(), 0..40)) {
        let set = RangeSet::from_ranges(ranges.iter().copied());

        prop_assert!(set.is_normalized());
        for pair in set.as_slice().windows(2) {
            // Adjacent ranges must have been merged
            prop_assert!(pair[0].end < pair[1].start, "{} and {} not merged", pair[0], pair[1]);
        }
        prop_assert_eq!(coverage(set.as_slice()), coverage(&ranges));

        let expected_bytes = coverage(&ranges).iter().filter(|b| **b).count() as u64;
        prop_assert_eq!(set.covered_bytes(), expected_bytes);
    }

    /// Insertion order does not matter
    #[test]
    fn prop_merge_order_independent(ranges in prop::collection::vec(arb_range(), 0..30)) {
        let forward = RangeSet::from_ranges(ranges.iter().copied());
        let backward = RangeSet::from_ranges(ranges.iter().rev().copied());
        prop_assert_eq!(forward, backward);
    }

    /// Re-inserting any covered range changes nothing
    #[test]
    fn prop_merge_idempotent(ranges in prop::collection::vec(arb_range(), 1..30)) {
        let mut set = RangeSet::from_ranges(ranges.iter().copied());
        let before = set.clone();
        for r in &ranges {
            prop_assert!(!set.insert(*r));
        }
        prop_assert_eq!(set, before);
    }

    /// Clipping keeps the covered total within the content length
    #[test]
    fn prop_clip_bounded_by_length(
        ranges in prop::collection::vec(arb_range(), 0..30),
        length in 1..SPAN,
    ) {
        let mut set = RangeSet::from_ranges(ranges);
        set.clip_to(length);
        prop_assert!(set.covered_bytes() <= length);
        prop_assert!(set.iter().all(|r| r.end <= length));
        prop_assert!(set.is_normalized());
    }

    /// Gaps reported for a request are exactly its uncovered bytes
    #[test]
    fn prop_missing_within_complements_coverage(
        ranges in prop::collection::vec(arb_range(), 0..20),
        request in arb_range(),
    ) {
        let set = RangeSet::from_ranges(ranges);
        let gaps = set.missing_within(&request);

        let gap_bytes: u64 = gaps.iter().map(|g| g.len()).sum();
        let covered = coverage(set.as_slice());
        let uncovered = (request.start..request.end).filter(|b| !covered[*b as usize]).count() as u64;
        prop_assert_eq!(gap_bytes, uncovered);
        prop_assert!(gaps.iter().all(|g| request.contains(g)));
        prop_assert_eq!(set.covers(&request), gaps.is_empty());
    }
}

#[test]
fn test_documented_merges() {
    let mut set = RangeSet::new();
    set.insert(ByteRange::new(0, 10).unwrap());
    set.insert(ByteRange::new(5, 15).unwrap());
    assert_eq!(set.as_slice(), &[ByteRange::new(0, 15).unwrap()]);

    let mut set = RangeSet::new();
    set.insert(ByteRange::new(0, 5).unwrap());
    set.insert(ByteRange::new(5, 10).unwrap());
    assert_eq!(set.as_slice(), &[ByteRange::new(0, 10).unwrap()]);
}
