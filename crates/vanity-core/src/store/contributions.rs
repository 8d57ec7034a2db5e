use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{STATE_SUFFIX, StoreError, checked_owner, read_json, write_json_atomic};
use crate::model::ContributionRecord;

/// Reads and writes `<owner>.json` contribution records.
#[derive(Debug, Clone)]
pub struct ContributionStore {
    dir: PathBuf,
}

impl ContributionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `owner`.
    pub fn path_for(&self, owner: &str) -> Result<PathBuf, StoreError> {
        Ok(self.dir.join(format!("{}.json", checked_owner(owner)?)))
    }

    /// Load `owner`'s record, or an empty one if none is stored.
    ///
    /// A stored record whose `owner` field disagrees with its file name is
    /// re-keyed to the file name.
    pub fn load(&self, owner: &str) -> Result<ContributionRecord, StoreError> {
        let path = self.path_for(owner)?;
        let Some(mut record) = read_json::<ContributionRecord>(&path)? else {
            debug!(owner, "no contribution record, starting empty");
            return Ok(ContributionRecord::empty(owner));
        };
        if record.owner != owner {
            debug!(owner, stored = %record.owner, "record owner differs from file name");
            record.owner = owner.to_string();
        }
        Ok(record)
    }

    /// Atomically overwrite the record keyed by `record.owner`.
    pub fn save(&self, record: &ContributionRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.owner)?;
        write_json_atomic(&path, record)?;
        debug!(owner = %record.owner, days = record.day_count(), "saved contribution record");
        Ok(())
    }

    /// Every user with a persisted record, in sorted order.
    ///
    /// A missing data directory yields an empty set.
    pub fn list_known_users(&self) -> Result<BTreeSet<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut users = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Read {
                path: self.dir.clone(),
                source,
            })?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(STATE_SUFFIX) {
                continue;
            }
            if let Some(user) = name.strip_suffix(".json") {
                if checked_owner(user).is_ok() {
                    users.insert(user.to_string());
                }
            }
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn day(s: &str) -> NaiveDate {
        s.parse().expect("valid date")
    }

    #[test]
    fn load_missing_returns_empty_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContributionStore::new(dir.path());
        let record = store.load("alice").expect("load");
        assert_eq!(record, ContributionRecord::empty("alice"));
    }

    #[test]
    fn save_then_load_is_lossless() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContributionStore::new(dir.path().join(".vanity"));
        let mut record = ContributionRecord::empty("alice");
        record.last_updated = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        record.days.insert(day("2024-04-30"), 9);
        record.days.insert(day("2023-12-31"), 1);

        store.save(&record).expect("save");
        assert_eq!(store.load("alice").expect("load"), record);
    }

    #[test]
    fn malformed_record_loads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("bob.json"), "[1, 2").expect("write");
        let store = ContributionStore::new(dir.path());
        assert_eq!(store.load("bob").expect("load"), ContributionRecord::empty("bob"));
    }

    #[test]
    fn list_known_users_skips_state_and_other_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContributionStore::new(dir.path());
        store.save(&ContributionRecord::empty("alice")).expect("save");
        store.save(&ContributionRecord::empty("bob")).expect("save");
        fs::write(dir.path().join("alice-state.json"), "{}").expect("write");
        fs::write(dir.path().join(".gitkeep"), "").expect("write");
        fs::write(dir.path().join("config.toml"), "").expect("write");
        fs::write(dir.path().join("carol.json.tmp"), "{}").expect("write");

        let users: Vec<String> = store.list_known_users().expect("list").into_iter().collect();
        assert_eq!(users, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn list_known_users_without_directory_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContributionStore::new(dir.path().join("missing"));
        assert!(store.list_known_users().expect("list").is_empty());
    }
}
