//! crates/praxis_core/src/conflict.rs
//!
//! Overlap detection between a candidate appointment and the appointments
//! already booked on the same date. Pure functions; no store access.

use crate::time::TimeRange;

/// True iff the two half-open ranges share at least one minute.
///
/// Touching endpoints are compatible: 9:00-10:00 does not overlap
/// 10:00-11:00.
pub fn overlaps(a: TimeRange, b: TimeRange) -> bool {
    a.start_minute() < b.end_minute() && b.start_minute() < a.end_minute()
}

/// Every range in `existing` that overlaps `candidate`. An empty result
/// means the candidate is placeable.
///
/// No ordering is assumed on `existing`; callers that query the same date
/// repeatedly (interactive editing) keep their per-date lists sorted by
/// start so downstream merging stays a single left-to-right pass.
pub fn find_conflicts(candidate: TimeRange, existing: &[TimeRange]) -> Vec<TimeRange> {
    existing
        .iter()
        .copied()
        .filter(|booked| overlaps(candidate, *booked))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u16, end: u16) -> TimeRange {
        TimeRange::new(start, end).unwrap()
    }

    #[test]
    fn overlap_is_symmetric() {
        let cases = [
            (range(540, 600), range(570, 630)),
            (range(540, 600), range(600, 660)),
            (range(540, 1080), range(600, 660)),
            (range(0, 1440), range(0, 1440)),
        ];
        for (a, b) in cases {
            assert_eq!(overlaps(a, b), overlaps(b, a), "asymmetric for {a} / {b}");
        }
    }

    #[test]
    fn a_range_overlaps_itself() {
        let a = range(540, 600);
        assert!(overlaps(a, a));
    }

    #[test]
    fn touching_endpoints_do_not_overlap() {
        assert!(!overlaps(range(540, 600), range(600, 660)));
        assert!(!overlaps(range(600, 660), range(540, 600)));
    }

    #[test]
    fn containment_counts_as_overlap() {
        assert!(overlaps(range(540, 1080), range(600, 660)));
        assert!(overlaps(range(600, 660), range(540, 1080)));
    }

    #[test]
    fn disjoint_ranges_produce_no_conflicts() {
        let existing = vec![range(540, 600), range(660, 720), range(780, 840)];
        assert!(find_conflicts(range(600, 660), &existing).is_empty());
        assert!(find_conflicts(range(720, 780), &existing).is_empty());
    }

    #[test]
    fn every_overlapping_range_is_reported() {
        let existing = vec![range(540, 600), range(660, 720), range(780, 840)];
        let conflicts = find_conflicts(range(570, 690), &existing);
        assert_eq!(conflicts, vec![range(540, 600), range(660, 720)]);
    }

    #[test]
    fn scan_needs_no_ordering() {
        let existing = vec![range(780, 840), range(540, 600), range(660, 720)];
        let conflicts = find_conflicts(range(590, 670), &existing);
        assert_eq!(conflicts, vec![range(540, 600), range(660, 720)]);
    }
}
