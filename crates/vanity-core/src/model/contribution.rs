use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One day's activity count as reported by an activity source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: u32,
}

impl DayCount {
    #[must_use]
    pub const fn new(date: NaiveDate, count: u32) -> Self {
        Self { date, count }
    }
}

/// Per-user record of activity counts, keyed by calendar date.
///
/// Persisted as `<owner>.json`. Days serialize as a list of
/// `{date, count}` objects in ascending date order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRecord {
    #[serde(alias = "username")]
    pub owner: String,
    #[serde(default, alias = "last_updated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, alias = "contributions", with = "day_list")]
    pub days: BTreeMap<NaiveDate, u32>,
}

impl ContributionRecord {
    /// Empty record for a user with no recorded activity.
    #[must_use]
    pub fn empty(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            last_updated: None,
            days: BTreeMap::new(),
        }
    }

    /// Recorded count for `date`, 0 when absent.
    #[must_use]
    pub fn count_on(&self, date: NaiveDate) -> u32 {
        self.days.get(&date).copied().unwrap_or(0)
    }

    /// Sum of all recorded counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.days.values().map(|&c| u64::from(c)).sum()
    }

    /// Number of distinct dates with a recorded count.
    #[must_use]
    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Most recent date with a recorded count.
    #[must_use]
    pub fn latest_day(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    /// Iterate days in ascending date order.
    pub fn iter_days(&self) -> impl Iterator<Item = DayCount> + '_ {
        self.days.iter().map(|(&date, &count)| DayCount { date, count })
    }
}

mod day_list {
    use super::{BTreeMap, DayCount, Deserialize, Deserializer, NaiveDate, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        days: &BTreeMap<NaiveDate, u32>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<DayCount> = days
            .iter()
            .map(|(&date, &count)| DayCount { date, count })
            .collect();
        list.serialize(serializer)
    }

    // Older writers emit `null` for an empty list.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<NaiveDate, u32>, D::Error> {
        let list: Option<Vec<DayCount>> = Option::deserialize(deserializer)?;
        Ok(list
            .unwrap_or_default()
            .into_iter()
            .map(|d| (d.date, d.count))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().expect("valid date")
    }

    #[test]
    fn serializes_days_as_sorted_list() {
        let mut record = ContributionRecord::empty("alice");
        record.days.insert(day("2024-01-02"), 1);
        record.days.insert(day("2024-01-01"), 3);

        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["owner"], "alice");
        assert_eq!(json["days"][0]["date"], "2024-01-01");
        assert_eq!(json["days"][0]["count"], 3);
        assert_eq!(json["days"][1]["date"], "2024-01-02");
        assert!(json.get("lastUpdated").is_none());
    }

    #[test]
    fn reads_legacy_field_names() {
        let raw = r#"{
            "username": "bob",
            "last_updated": "2024-03-01T10:15:00.123456-05:00",
            "contributions": [{"date": "2024-01-01", "count": 4}]
        }"#;
        let record: ContributionRecord = serde_json::from_str(raw).expect("parse legacy");
        assert_eq!(record.owner, "bob");
        assert_eq!(record.count_on(day("2024-01-01")), 4);
        assert!(record.last_updated.is_some());
    }

    #[test]
    fn null_day_list_reads_as_empty() {
        let raw = r#"{"owner": "carol", "days": null}"#;
        let record: ContributionRecord = serde_json::from_str(raw).expect("parse");
        assert!(record.days.is_empty());
    }

    #[test]
    fn totals_and_latest_day() {
        let mut record = ContributionRecord::empty("dana");
        record.days.insert(day("2024-02-01"), 2);
        record.days.insert(day("2024-02-03"), 5);
        assert_eq!(record.total(), 7);
        assert_eq!(record.day_count(), 2);
        assert_eq!(record.latest_day(), Some(day("2024-02-03")));
        assert_eq!(record.count_on(day("2024-02-02")), 0);
    }
}
