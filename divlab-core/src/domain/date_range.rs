//! Inclusive calendar date ranges, their partitioning into sub-ranges, and
//! interval arithmetic over sorted coverage lists.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DateRangeError {
    #[error("invalid date range: start {start} is after end {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
}

/// Inclusive `[start, end]` range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of calendar days covered (always >= 1).
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Overlapping or directly adjacent (no calendar day between them).
    pub fn touches(&self, other: &DateRange) -> bool {
        self.start <= other.end + Duration::days(1) && other.start <= self.end + Duration::days(1)
    }

    /// The parts of this range not covered by any of `covered`, in date order.
    /// `covered` may be unsorted and overlapping.
    pub fn subtract(&self, covered: &[DateRange]) -> Vec<DateRange> {
        let mut sorted: Vec<DateRange> = covered
            .iter()
            .filter(|c| c.start <= self.end && self.start <= c.end)
            .copied()
            .collect();
        sorted.sort_by_key(|c| c.start);

        let mut out = Vec::new();
        let mut cursor = self.start;
        for c in sorted {
            if c.start > cursor {
                out.push(DateRange { start: cursor, end: c.start - Duration::days(1) });
            }
            if c.end >= cursor {
                if c.end >= self.end {
                    return out;
                }
                cursor = c.end + Duration::days(1);
            }
        }
        out.push(DateRange { start: cursor, end: self.end });
        out
    }

    /// Insert `range` into a sorted, disjoint, non-adjacent list, merging
    /// every interval it touches.
    pub fn merge_into(ranges: &mut Vec<DateRange>, range: DateRange) {
        let mut merged = range;
        ranges.retain(|r| {
            if r.touches(&merged) {
                merged.start = merged.start.min(r.start);
                merged.end = merged.end.max(r.end);
                false
            } else {
                true
            }
        });
        let at = ranges.partition_point(|r| r.start < merged.start);
        ranges.insert(at, merged);
    }

    /// Split into disjoint, contiguous sub-ranges of at most `chunk_days` days,
    /// in increasing date order.
    pub fn split(&self, chunk_days: u32) -> Vec<DateRange> {
        let chunk = i64::from(chunk_days.max(1));
        let mut out = Vec::new();
        let mut cursor = self.start;
        while cursor <= self.end {
            let end = (cursor + Duration::days(chunk - 1)).min(self.end);
            out.push(DateRange { start: cursor, end });
            cursor = end + Duration::days(1);
        }
        out
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn rejects_inverted_range() {
        let err = DateRange::new(d("2024-02-01"), d("2024-01-01")).unwrap_err();
        assert!(matches!(err, DateRangeError::Inverted { .. }));
    }

    #[test]
    fn split_is_disjoint_and_contiguous() {
        let range = DateRange::new(d("2024-01-01"), d("2024-01-31")).unwrap();
        let parts = range.split(7);
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0].start, d("2024-01-01"));
        assert_eq!(parts[0].end, d("2024-01-07"));
        assert_eq!(parts[4].start, d("2024-01-29"));
        assert_eq!(parts[4].end, d("2024-01-31"));
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end + Duration::days(1), pair[1].start);
        }
        let total: i64 = parts.iter().map(|p| p.days()).sum();
        assert_eq!(total, range.days());
    }

    #[test]
    fn single_day_range_splits_to_itself() {
        let range = DateRange::new(d("2024-03-05"), d("2024-03-05")).unwrap();
        assert_eq!(range.split(30), vec![range]);
    }

    fn r(a: &str, b: &str) -> DateRange {
        DateRange::new(d(a), d(b)).unwrap()
    }

    #[test]
    fn subtract_trims_synced_prefix() {
        let range = r("2024-01-01", "2024-01-31");
        assert_eq!(
            range.subtract(&[r("2023-12-01", "2024-01-15")]),
            vec![r("2024-01-16", "2024-01-31")]
        );
        assert_eq!(range.subtract(&[r("2023-11-01", "2023-12-01")]), vec![range]);
    }

    #[test]
    fn subtract_leaves_gaps_on_both_sides() {
        let want = r("2024-01-01", "2024-01-31");
        let gaps = want.subtract(&[r("2024-01-10", "2024-01-15"), r("2024-01-20", "2024-02-10")]);
        assert_eq!(
            gaps,
            vec![r("2024-01-01", "2024-01-09"), r("2024-01-16", "2024-01-19")]
        );
    }

    #[test]
    fn subtract_of_covered_range_is_empty() {
        let want = r("2024-01-05", "2024-01-06");
        assert!(want.subtract(&[r("2024-01-01", "2024-01-31")]).is_empty());
        assert_eq!(want.subtract(&[]), vec![want]);
        assert_eq!(want.subtract(&[r("2023-01-01", "2023-01-31")]), vec![want]);
    }

    #[test]
    fn merge_into_joins_adjacent_and_overlapping() {
        let mut cover = Vec::new();
        DateRange::merge_into(&mut cover, r("2024-01-10", "2024-01-31"));
        DateRange::merge_into(&mut cover, r("2024-03-01", "2024-03-07"));
        assert_eq!(cover.len(), 2);
        DateRange::merge_into(&mut cover, r("2024-01-01", "2024-01-09"));
        assert_eq!(cover, vec![r("2024-01-01", "2024-01-31"), r("2024-03-01", "2024-03-07")]);
        DateRange::merge_into(&mut cover, r("2024-01-20", "2024-03-03"));
        assert_eq!(cover, vec![r("2024-01-01", "2024-03-07")]);
    }

    proptest::proptest! {
        #[test]
        fn subtract_and_cover_partition_the_range(
            a in 0i64..60, len in 0i64..40,
            holes in proptest::collection::vec((0i64..90, 0i64..15), 0..6),
        ) {
            let base = d("2024-01-01");
            let want = DateRange::new(base + Duration::days(a), base + Duration::days(a + len)).unwrap();
            let mut cover = Vec::new();
            for (s, l) in holes {
                let c = DateRange::new(base + Duration::days(s), base + Duration::days(s + l)).unwrap();
                DateRange::merge_into(&mut cover, c);
            }
            for pair in cover.windows(2) {
                proptest::prop_assert!(pair[0].end + Duration::days(1) < pair[1].start);
            }
            let gaps = want.subtract(&cover);
            let mut day = want.start;
            while day <= want.end {
                let in_gap = gaps.iter().any(|g| g.contains(day));
                let in_cover = cover.iter().any(|c| c.contains(day));
                proptest::prop_assert!(in_gap != in_cover);
                day += Duration::days(1);
            }
            proptest::prop_assert!(gaps.iter().all(|g| want.start <= g.start && g.end <= want.end));
        }
    }
}
