use std::path::{Path, PathBuf};

use tracing::debug;

use super::{STATE_SUFFIX, StoreError, checked_owner, read_json, write_json_atomic};
use crate::model::ReplayState;

/// Reads and writes `<owner>-state.json` replay state files.
#[derive(Debug, Clone)]
pub struct ReplayStateStore {
    dir: PathBuf,
}

impl ReplayStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, owner: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .dir
            .join(format!("{}{STATE_SUFFIX}", checked_owner(owner)?)))
    }

    /// Load `owner`'s replay state; absent or unreadable state starts empty.
    pub fn load(&self, owner: &str) -> Result<ReplayState, StoreError> {
        let path = self.path_for(owner)?;
        let mut state = read_json::<ReplayState>(&path)?.unwrap_or_else(|| {
            debug!(owner, "no replay state, starting empty");
            ReplayState::empty(owner)
        });
        state.owner = owner.to_string();
        Ok(state)
    }

    pub fn save(&self, state: &ReplayState) -> Result<(), StoreError> {
        let path = self.path_for(&state.owner)?;
        write_json_atomic(&path, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;

    #[test]
    fn load_missing_state_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ReplayStateStore::new(dir.path());
        let state = store.load("alice").expect("load");
        assert_eq!(state.owner, "alice");
        assert!(state.replayed_counts.is_empty());
        assert!(state.last_sync.is_none());
    }

    #[test]
    fn save_overwrites_previous_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ReplayStateStore::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");

        let mut state = ReplayState::empty("alice");
        state.set_replayed("bob", date, 1);
        store.save(&state).expect("first save");
        state.set_replayed("bob", date, 3);
        store.save(&state).expect("second save");

        let loaded = store.load("alice").expect("load");
        assert_eq!(loaded.get_replayed("bob", date), 3);
        assert!(dir.path().join("alice-state.json").is_file());
    }

    #[test]
    fn corrupt_state_loads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("alice-state.json"), "garbage").expect("write");
        let store = ReplayStateStore::new(dir.path());
        assert!(store.load("alice").expect("load").replayed_counts.is_empty());
    }
}
