//! File-backed stores under `.vanity/`.
//!
//! # Directory Layout
//!
//! ```text
//! .vanity/
//!   alice.json          # alice's ContributionRecord (written only by alice)
//!   alice-state.json    # alice's ReplayState
//!   bob.json            # bob's ContributionRecord
//!   config.toml         # optional project config
//!   sync.lock           # local advisory lock (git-ignored)
//! ```
//!
//! # Invariants
//!
//! - Every write goes to `<name>.tmp` first and is renamed into place.
//! - A missing or malformed record loads as empty; the shared directory is a
//!   cooperative convention between operators, not a database.
//! - The set of known users is whatever `<user>.json` files exist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::ErrorCode;

pub mod contributions;
pub mod replay;

pub use contributions::ContributionStore;
pub use replay::ReplayStateStore;

/// Name of the data directory at the repository root.
pub const DATA_DIR: &str = ".vanity";

/// Suffix distinguishing replay state files from contribution records.
pub const STATE_SUFFIX: &str = "-state.json";

/// Errors raised by the file-backed stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("invalid user name for a data file: {0:?}")]
    InvalidOwner(String),

    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::InvalidOwner(_) => ErrorCode::InternalUnexpected,
            Self::Write { .. } | Self::Encode { .. } => ErrorCode::StoreWriteFailed,
        }
    }
}

/// Resolve the data directory for a repository root.
#[must_use]
pub fn data_dir(project_root: &Path) -> PathBuf {
    project_root.join(DATA_DIR)
}

/// Reject names that would escape the data directory or collide with
/// internal files.
fn checked_owner(owner: &str) -> Result<&str, StoreError> {
    let valid = !owner.is_empty()
        && !owner.starts_with('.')
        && owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(owner)
    } else {
        Err(StoreError::InvalidOwner(owner.to_string()))
    }
}

/// Read and decode a JSON file.
///
/// `Ok(None)` when the file is absent or does not decode; only genuine I/O
/// failures are errors.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring malformed data file");
            Ok(None)
        }
    }
}

/// Encode `value` as pretty JSON and atomically replace `path`.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut encoded = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    encoded.push(b'\n');

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &encoded).map_err(|source| StoreError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.json");
        write_json_atomic(&path, &serde_json::json!({"a": 1})).expect("write");

        assert!(path.is_file());
        assert!(!dir.path().join("x.json.tmp").exists());
        let back: Option<serde_json::Value> = read_json(&path).expect("read");
        assert_eq!(back, Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn owner_names_are_path_safe() {
        assert!(checked_owner("octo-cat_1").is_ok());
        assert!(checked_owner("../etc").is_err());
        assert!(checked_owner("a/b").is_err());
        assert!(checked_owner("").is_err());
        assert!(checked_owner(".hidden").is_err());
    }

    #[test]
    fn malformed_json_reads_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").expect("write");
        let back: Option<serde_json::Value> = read_json(&path).expect("read");
        assert!(back.is_none());
    }
}
