//! Replay reconciliation: turn other collaborators' contribution records
//! into mirror commits in the operator's own history.
//!
//! For every other known user `S` and every date `d` in `S`'s record the
//! engine computes
//!
//! ```text
//! owed = S.days[d] - replayed[S][d]
//! ```
//!
//! and emits `owed` mirror commits when it is positive. After each emitted
//! run the replayed counter for `(S, d)` is advanced to the number of
//! commits that now exist, so a rerun after a crash computes the same `owed`
//! for untouched dates and zero for finished ones.
//!
//! # Batching
//!
//! Every `batch_size` emitted commits the replay state is persisted and the
//! history is pushed. A single large day is split across batches, so the
//! number of pushed-but-unrecorded or recorded-but-unpushed commits never
//! exceeds one batch.
//!
//! # Failures
//!
//! - Loading a collaborator's record or emitting its commits: logged,
//!   recorded on that collaborator's [`SourceReport`], and the pass moves on.
//! - Listing collaborators, persisting state, committing, or pushing: fatal,
//!   returned to the caller.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::collab::{CollabError, EmitRequest, History};
use crate::error::ErrorCode;
use crate::model::{ContributionRecord, ReplayState};
use crate::store::{ContributionStore, ReplayStateStore, StoreError};

/// Default number of mirror commits between checkpoint pushes.
pub const DEFAULT_BATCH_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Immutable settings for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Compute and report only; no store writes, commits, or pushes.
    pub dry_run: bool,
    /// Checkpoint after this many emitted commits; 0 disables checkpoints.
    pub batch_size: usize,
    /// History was rewritten; pushes must overwrite the remote.
    pub rebuild: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
            rebuild: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to persist replay state: {0}")]
    Persist(#[from] StoreError),

    #[error("failed to list collaborators: {0}")]
    Load(#[source] StoreError),

    #[error("push failed: {0}")]
    Push(#[source] CollabError),

    #[error("failed to commit data files: {0}")]
    Commit(#[source] CollabError),

    #[error("rebuild failed while trying to {step}: {source}")]
    Rebuild {
        step: &'static str,
        #[source]
        source: CollabError,
    },

    #[error("rebuild could not snapshot {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReconcileError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Persist(err) | Self::Load(err) => err.code(),
            Self::Push(_) => ErrorCode::PushFailed,
            Self::Commit(_) | Self::Rebuild { .. } => ErrorCode::InternalUnexpected,
            Self::Snapshot { .. } => ErrorCode::StoreWriteFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One date that owed mirror commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedReplay {
    pub date: NaiveDate,
    /// Commits mirrored before this pass.
    pub already: u32,
    /// The source's recorded count.
    pub target: u32,
    pub owed: u32,
}

/// A date where the source's count dropped below what was already mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Regression {
    pub date: NaiveDate,
    pub recorded: u32,
    pub replayed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub emitted: u64,
    pub planned: Vec<PlannedReplay>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regressions: Vec<Regression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub rebuild: bool,
    pub sources: Vec<SourceReport>,
    /// Mirror commits created (or, in a dry run, that would be created).
    pub emitted: u64,
    /// Intermediate persist-and-push checkpoints.
    pub checkpoints: usize,
    pub committed: bool,
    pub pushed: bool,
}

impl ReconcileReport {
    /// Collaborators whose replay failed this pass.
    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.error.is_some())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives mirror commit emission for one operator.
pub struct Reconciler<'a, H: History> {
    contributions: &'a ContributionStore,
    states: &'a ReplayStateStore,
    history: &'a mut H,
    config: ReconcileConfig,
    /// Commits emitted since the last checkpoint.
    pending: usize,
    checkpoints: usize,
}

impl<'a, H: History> Reconciler<'a, H> {
    pub fn new(
        contributions: &'a ContributionStore,
        states: &'a ReplayStateStore,
        history: &'a mut H,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            contributions,
            states,
            history,
            config,
            pending: 0,
            checkpoints: 0,
        }
    }

    /// Replace the history with a fresh orphan branch holding only the data
    /// directory, and forget every replayed counter.
    ///
    /// In a dry run only the in-memory state is cleared, so the following
    /// pass previews a full re-emission.
    pub fn rebuild(&mut self, state: &mut ReplayState) -> Result<(), ReconcileError> {
        if self.config.dry_run {
            info!("dry run: would wipe mirror history and replay everything");
            state.clear_all();
            return Ok(());
        }

        info!("rebuilding mirror history");
        let data_dir = self.contributions.dir().to_path_buf();
        let snapshot = snapshot_dir(&data_dir)?;

        self.history
            .reset_to_orphan()
            .map_err(|source| ReconcileError::Rebuild {
                step: "create orphan branch",
                source,
            })?;

        fs::create_dir_all(&data_dir).map_err(|source| ReconcileError::Snapshot {
            path: data_dir.clone(),
            source,
        })?;
        for (path, bytes) in &snapshot {
            fs::write(path, bytes).map_err(|source| ReconcileError::Snapshot {
                path: path.clone(),
                source,
            })?;
        }

        self.history
            .commit_paths("vanity: rebuild init", &[data_dir.as_path()])
            .map_err(|source| ReconcileError::Rebuild {
                step: "commit data files",
                source,
            })?;
        self.history
            .delete_history()
            .map_err(|source| ReconcileError::Rebuild {
                step: "delete old history",
                source,
            })?;
        self.history
            .rename_to_main()
            .map_err(|source| ReconcileError::Rebuild {
                step: "rename branch",
                source,
            })?;

        state.clear_all();
        info!(files = snapshot.len(), "history wiped, replaying from scratch");
        Ok(())
    }

    /// Reconcile `state` against every other known user, then persist,
    /// commit, and push.
    pub fn run(
        &mut self,
        state: &mut ReplayState,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport {
            dry_run: self.config.dry_run,
            rebuild: self.config.rebuild,
            ..ReconcileReport::default()
        };

        let operator = state.owner.clone();
        let users = self
            .contributions
            .list_known_users()
            .map_err(ReconcileError::Load)?;
        for user in users.iter().filter(|u| **u != operator) {
            let source_report = match self.contributions.load(user) {
                Ok(record) => self.reconcile_source(state, &record)?,
                Err(err) => {
                    warn!(source = %user, error = %err, "skipping collaborator");
                    SourceReport {
                        error: Some(err.to_string()),
                        ..SourceReport::new(user)
                    }
                }
            };
            report.emitted += source_report.emitted;
            report.sources.push(source_report);
        }

        state.last_sync = Some(now);
        if self.config.dry_run {
            report.checkpoints = self.checkpoints;
            return Ok(report);
        }

        self.states.save(state)?;
        self.pending = 0;

        if self
            .history
            .has_pending_edits()
            .map_err(ReconcileError::Commit)?
        {
            let message = format!("vanity: sync {}", state.owner);
            self.history
                .commit_paths(&message, &[self.contributions.dir()])
                .map_err(ReconcileError::Commit)?;
            report.committed = true;
        }

        report.pushed = self.push()?;
        report.checkpoints = self.checkpoints;
        Ok(report)
    }

    /// Emit whatever `record`'s owner is still owed.
    ///
    /// Emission failures end this collaborator's pass and are reported on
    /// the returned [`SourceReport`]; checkpoint failures are returned.
    pub fn reconcile_source(
        &mut self,
        state: &mut ReplayState,
        record: &ContributionRecord,
    ) -> Result<SourceReport, ReconcileError> {
        let source = record.owner.as_str();
        let mut report = SourceReport::new(source);

        for day in record.iter_days() {
            let already = state.get_replayed(source, day.date);
            let owed = i64::from(day.count) - i64::from(already);

            if owed < 0 {
                warn!(
                    source,
                    date = %day.date,
                    recorded = day.count,
                    replayed = already,
                    "source count regressed below mirrored count; not retracting"
                );
                report.regressions.push(Regression {
                    date: day.date,
                    recorded: day.count,
                    replayed: already,
                });
                continue;
            }
            if owed == 0 {
                trace!(source, date = %day.date, "nothing owed");
                continue;
            }

            let owed = day.count - already;
            report.planned.push(PlannedReplay {
                date: day.date,
                already,
                target: day.count,
                owed,
            });

            if self.config.dry_run {
                debug!(source, date = %day.date, owed, "dry run: would mirror");
                state.set_replayed(source, day.date, day.count);
                report.emitted += u64::from(owed);
                continue;
            }

            if let Err(err) = self.replay_day(state, source, day.date, already, day.count, &mut report)
            {
                match err {
                    DayError::Emit(err) => {
                        warn!(source, date = %day.date, error = %err, "mirror commits failed; skipping collaborator");
                        report.error = Some(err.to_string());
                        break;
                    }
                    DayError::Fatal(err) => return Err(err),
                }
            }
        }

        if report.emitted > 0 {
            info!(source, emitted = report.emitted, "mirrored contributions");
        }
        Ok(report)
    }

    /// Emit commits for one date in runs that never cross a checkpoint.
    fn replay_day(
        &mut self,
        state: &mut ReplayState,
        source: &str,
        date: NaiveDate,
        already: u32,
        target: u32,
        report: &mut SourceReport,
    ) -> Result<(), DayError> {
        let mut done = already;
        while done < target {
            let remaining = target - done;
            let room = if self.config.batch_size == 0 {
                remaining
            } else {
                let left = self.config.batch_size.saturating_sub(self.pending).max(1);
                u32::try_from(left).unwrap_or(u32::MAX).min(remaining)
            };

            let request = EmitRequest {
                date,
                attribution: source,
                first: done,
                count: room,
                day_total: target,
            };
            let outcome = self.history.emit(&request);
            let emitted = match &outcome {
                Ok(()) => room,
                Err(err) => err.partially_emitted().min(room),
            };

            done += emitted;
            state.set_replayed(source, date, done);
            report.emitted += u64::from(emitted);
            self.pending += emitted as usize;

            outcome.map_err(DayError::Emit)?;

            if self.config.batch_size > 0 && self.pending >= self.config.batch_size {
                self.checkpoint(state).map_err(DayError::Fatal)?;
            }
        }
        Ok(())
    }

    /// Persist state then push, resetting the pending counter.
    fn checkpoint(&mut self, state: &ReplayState) -> Result<(), ReconcileError> {
        info!(pending = self.pending, "checkpoint: saving state and pushing");
        self.states.save(state)?;
        self.push()?;
        self.pending = 0;
        self.checkpoints += 1;
        Ok(())
    }

    /// Push (or force push after a rebuild). `false` when there is no remote.
    fn push(&mut self) -> Result<bool, ReconcileError> {
        if !self.history.has_remote() {
            debug!("no remote configured; skipping push");
            return Ok(false);
        }
        let result = if self.config.rebuild {
            self.history.force_push()
        } else {
            self.history.push()
        };
        result.map_err(ReconcileError::Push)?;
        Ok(true)
    }
}

enum DayError {
    Emit(CollabError),
    Fatal(ReconcileError),
}

/// Read every regular file directly inside `dir`.
fn snapshot_dir(dir: &std::path::Path) -> Result<Vec<(PathBuf, Vec<u8>)>, ReconcileError> {
    let snapshot_err = |path: PathBuf| move |source| ReconcileError::Snapshot { path, source };

    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(source) => return Err(snapshot_err(dir.to_path_buf())(source)),
    };
    for entry in entries {
        let entry = entry.map_err(snapshot_err(dir.to_path_buf()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let bytes = fs::read(&path).map_err(snapshot_err(path.clone()))?;
        files.push((path, bytes));
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryHistory;
    use chrono::TimeZone;

    fn day(s: &str) -> NaiveDate {
        s.parse().expect("valid date")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        contributions: ContributionStore,
        states: ReplayStateStore,
    }

    fn fixture(records: &[(&str, &[(&str, u32)])]) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = dir.path().join(".vanity");
        let contributions = ContributionStore::new(&data);
        for (owner, days) in records {
            let mut record = ContributionRecord::empty(*owner);
            for &(d, c) in *days {
                record.days.insert(day(d), c);
            }
            contributions.save(&record).expect("save record");
        }
        Fixture {
            _dir: dir,
            contributions,
            states: ReplayStateStore::new(&data),
        }
    }

    #[test]
    fn skips_the_operator_own_record() {
        let fx = fixture(&[("alice", &[("2024-01-01", 4)]), ("bob", &[("2024-01-01", 1)])]);
        let mut history = MemoryHistory::new();
        let mut state = ReplayState::empty("alice");

        let report = Reconciler::new(
            &fx.contributions,
            &fx.states,
            &mut history,
            ReconcileConfig::default(),
        )
        .run(&mut state, now())
        .expect("run");

        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.sources[0].source, "bob");
        assert_eq!(history.commits().len(), 1);
        assert!(state.replayed_counts.get("alice").is_none());
    }

    #[test]
    fn regression_is_reported_not_retracted() {
        let fx = fixture(&[("bob", &[("2024-01-01", 1)])]);
        let mut history = MemoryHistory::new();
        let mut state = ReplayState::empty("alice");
        state.set_replayed("bob", day("2024-01-01"), 3);

        let report = Reconciler::new(
            &fx.contributions,
            &fx.states,
            &mut history,
            ReconcileConfig::default(),
        )
        .run(&mut state, now())
        .expect("run");

        assert_eq!(report.emitted, 0);
        assert_eq!(report.sources[0].regressions.len(), 1);
        assert_eq!(state.get_replayed("bob", day("2024-01-01")), 3);
        assert!(history.commits().is_empty());
    }

    #[test]
    fn dry_run_has_no_side_effects() {
        let fx = fixture(&[("bob", &[("2024-01-01", 3)])]);
        let mut history = MemoryHistory::new();
        let mut state = ReplayState::empty("alice");
        let config = ReconcileConfig {
            dry_run: true,
            batch_size: 1,
            ..ReconcileConfig::default()
        };

        let report = Reconciler::new(&fx.contributions, &fx.states, &mut history, config)
            .run(&mut state, now())
            .expect("run");

        assert_eq!(report.emitted, 3);
        assert_eq!(report.sources[0].planned[0].owed, 3);
        assert!(history.commits().is_empty());
        assert!(history.pushes().is_empty());
        assert!(!fx.states.path_for("alice").expect("path").exists());
    }

    #[test]
    fn emission_failure_isolated_per_collaborator() {
        let fx = fixture(&[
            ("bob", &[("2024-01-01", 2), ("2024-01-02", 2)]),
            ("carol", &[("2024-01-01", 1)]),
        ]);
        let mut history = MemoryHistory::new();
        history.fail_emit_for("bob", 1);
        let mut state = ReplayState::empty("alice");

        let report = Reconciler::new(
            &fx.contributions,
            &fx.states,
            &mut history,
            ReconcileConfig::default(),
        )
        .run(&mut state, now())
        .expect("pass continues past one collaborator");

        let bob = &report.sources[0];
        assert!(bob.error.is_some());
        assert_eq!(bob.emitted, 1);
        assert_eq!(state.get_replayed("bob", day("2024-01-01")), 1);
        assert_eq!(state.get_replayed("bob", day("2024-01-02")), 0);
        assert_eq!(state.get_replayed("carol", day("2024-01-01")), 1);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn push_failure_is_fatal() {
        let fx = fixture(&[("bob", &[("2024-01-01", 2)])]);
        let mut history = MemoryHistory::new();
        history.fail_pushes();
        let mut state = ReplayState::empty("alice");

        let err = Reconciler::new(
            &fx.contributions,
            &fx.states,
            &mut history,
            ReconcileConfig::default(),
        )
        .run(&mut state, now())
        .expect_err("push failure must surface");

        assert_eq!(err.code(), ErrorCode::PushFailed);
        let saved = fx.states.load("alice").expect("load");
        assert_eq!(saved.get_replayed("bob", day("2024-01-01")), 2);
    }

    #[test]
    fn rebuild_pushes_with_force() {
        let fx = fixture(&[("bob", &[("2024-01-01", 2)])]);
        let mut history = MemoryHistory::new();
        let mut state = ReplayState::empty("alice");
        state.set_replayed("bob", day("2024-01-01"), 2);
        let config = ReconcileConfig {
            rebuild: true,
            ..ReconcileConfig::default()
        };

        let mut engine = Reconciler::new(&fx.contributions, &fx.states, &mut history, config);
        engine.rebuild(&mut state).expect("rebuild");
        let report = engine.run(&mut state, now()).expect("run");

        assert_eq!(report.emitted, 2);
        assert!(history.pushes().iter().all(|p| p.force));
        assert_eq!(history.rebuilds(), 1);
        assert!(fx.contributions.path_for("bob").expect("path").is_file());
    }

    #[test]
    fn no_remote_skips_push_but_persists() {
        let fx = fixture(&[("bob", &[("2024-01-01", 5)])]);
        let mut history = MemoryHistory::without_remote();
        let mut state = ReplayState::empty("alice");
        let config = ReconcileConfig {
            batch_size: 2,
            ..ReconcileConfig::default()
        };

        let report = Reconciler::new(&fx.contributions, &fx.states, &mut history, config)
            .run(&mut state, now())
            .expect("run");

        assert!(!report.pushed);
        assert!(history.pushes().is_empty());
        assert_eq!(report.checkpoints, 2);
        assert_eq!(
            fx.states.load("alice").expect("load").get_replayed("bob", day("2024-01-01")),
            5
        );
    }

    #[test]
    fn unreadable_data_dir_is_a_load_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = dir.path().join(".vanity");
        std::fs::write(&data, "not a directory").expect("write");
        let contributions = ContributionStore::new(&data);
        let states = ReplayStateStore::new(&data);
        let mut history = MemoryHistory::new();
        let mut state = ReplayState::empty("alice");

        let err = Reconciler::new(&contributions, &states, &mut history, ReconcileConfig::default())
            .run(&mut state, now())
            .expect_err("listing must fail");

        assert!(matches!(err, ReconcileError::Load(_)));
        assert!(err.to_string().starts_with("failed to list collaborators"));
        assert!(history.commits().is_empty());
    }
}
