use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Per-date replay counters for one source user.
pub type DateCounts = BTreeMap<NaiveDate, u32>;

/// How much of each collaborator's history the local operator has mirrored.
///
/// `replayed_counts[source][date]` is the number of mirror commits already
/// created for that pair. Values only move forward between rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayState {
    #[serde(alias = "username")]
    pub owner: String,
    #[serde(default, alias = "last_sync", skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default, alias = "mirrored_counts", deserialize_with = "null_as_empty")]
    pub replayed_counts: BTreeMap<String, DateCounts>,
}

impl ReplayState {
    #[must_use]
    pub fn empty(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            last_sync: None,
            replayed_counts: BTreeMap::new(),
        }
    }

    /// Replay actions already emitted for `(source, date)`; 0 when absent.
    #[must_use]
    pub fn get_replayed(&self, source: &str, date: NaiveDate) -> u32 {
        self.replayed_counts
            .get(source)
            .and_then(|dates| dates.get(&date))
            .copied()
            .unwrap_or(0)
    }

    /// Record the new replayed total for `(source, date)`.
    pub fn set_replayed(&mut self, source: &str, date: NaiveDate, count: u32) {
        self.replayed_counts
            .entry(source.to_string())
            .or_default()
            .insert(date, count);
    }

    /// Forget every replayed counter. Only a rebuild does this.
    pub fn clear_all(&mut self) {
        self.replayed_counts.clear();
    }

    /// Number of dates replayed from `source`.
    #[must_use]
    pub fn replayed_dates(&self, source: &str) -> usize {
        self.replayed_counts.get(source).map_or(0, BTreeMap::len)
    }

    /// Total replay actions emitted for `source`.
    #[must_use]
    pub fn replayed_total(&self, source: &str) -> u64 {
        self.replayed_counts
            .get(source)
            .map_or(0, |dates| dates.values().map(|&c| u64::from(c)).sum())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, DateCounts>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}
