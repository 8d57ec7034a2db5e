//! Merge freshly fetched day counts into a stored contribution record.
//!
//! # Merge Semantics
//!
//! The upstream calendar recomputes the full count for every day it reports,
//! so a fetched count *replaces* the stored one instead of adding to it.
//! Fetch windows may overlap freely: a day seen twice is simply written
//! twice with the same value. Days the fetch did not cover keep their stored
//! value.
//!
//! Zero-count days are filtered upstream, so a regression to zero should
//! never arrive here. If any lower count does arrive, the incoming value
//! still wins; it is reported in [`MergeSummary::lowered`] and logged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::model::{ContributionRecord, DayCount};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What a merge changed, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    /// Dates that were not in the stored record.
    pub added: usize,
    /// Dates whose count went up.
    pub raised: usize,
    /// Dates whose count went down (upstream regression).
    pub lowered: usize,
    /// Dates reported with the count already stored.
    pub unchanged: usize,
}

impl MergeSummary {
    /// Whether the merge changed any stored count.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.added + self.raised + self.lowered > 0
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Merge `incoming` day counts into `existing`, stamped with `now`.
///
/// Pure: the same inputs always give the same record.
///
/// # Examples
///
/// ```
/// use chrono::{NaiveDate, Utc};
/// use vanity_core::model::{ContributionRecord, DayCount};
/// use vanity_core::sync::merge::merge;
///
/// let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let merged = merge(&ContributionRecord::empty("alice"), &[DayCount::new(day, 3)], Utc::now());
/// assert_eq!(merged.count_on(day), 3);
/// ```
#[must_use]
pub fn merge(
    existing: &ContributionRecord,
    incoming: &[DayCount],
    now: DateTime<Utc>,
) -> ContributionRecord {
    merge_with_summary(existing, incoming, now).0
}

/// Same as [`merge`], also returning a [`MergeSummary`].
#[must_use]
pub fn merge_with_summary(
    existing: &ContributionRecord,
    incoming: &[DayCount],
    now: DateTime<Utc>,
) -> (ContributionRecord, MergeSummary) {
    let mut days = existing.days.clone();
    let mut summary = MergeSummary::default();

    for day in incoming {
        match days.insert(day.date, day.count) {
            None => summary.added += 1,
            Some(prev) if prev < day.count => summary.raised += 1,
            Some(prev) if prev > day.count => {
                warn!(
                    owner = %existing.owner,
                    date = %day.date,
                    stored = prev,
                    incoming = day.count,
                    "fetched count is lower than stored count; keeping fetched value"
                );
                summary.lowered += 1;
            }
            Some(_) => summary.unchanged += 1,
        }
    }

    let merged = ContributionRecord {
        owner: existing.owner.clone(),
        last_updated: Some(now),
        days,
    };
    (merged, summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
