//! Draw-result extraction.
//!
//! The external results process publishes one raw container per write, and a
//! container may hold entries for several dates keyed by `yyyy-MM-dd`
//! strings. Settlement only ever wants one date, so this flattens the
//! matching entries out and ignores everything else.

use chrono::NaiveDate;

use crate::models::{DrawOutcomeEntry, RawDrawRecord};

/// All outcome entries published for `date`. Keys that do not parse as the
/// requested calendar date are skipped, never an error; an unpublished date
/// yields an empty list.
pub fn extract_outcomes(date: NaiveDate, raw: &RawDrawRecord) -> Vec<DrawOutcomeEntry> {
    raw.days
        .iter()
        .filter(|(key, _)| {
            NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .map(|parsed| parsed == date)
                .unwrap_or(false)
        })
        .flat_map(|(_, entries)| entries.iter().cloned())
        .collect()
}
