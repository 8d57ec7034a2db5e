//! In-memory collaborator doubles for exercising the reconciliation engine
//! without git or network access.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};

use crate::collab::{ActivitySource, CollabError, EmitRequest, History, filter_days};
use crate::model::{DayCount, ReplayState};

/// A mirror commit recorded by [`MemoryHistory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorCommit {
    pub date: NaiveDate,
    pub at: NaiveDateTime,
    pub attribution: String,
    pub message: String,
}

/// A push observed by [`MemoryHistory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    pub force: bool,
    /// Mirror commits in history at push time.
    pub commits: usize,
    /// Total replayed count found in the watched state file at push time.
    pub persisted_replayed: Option<u64>,
}

#[derive(Debug, Clone)]
struct EmitFault {
    attribution: String,
    /// Commits allowed through before the failure.
    allow: u32,
}

/// Records every call instead of touching a repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    commits: Vec<MirrorCommit>,
    /// Commits of the branch replaced by an orphan, until deleted.
    previous: Vec<MirrorCommit>,
    data_commits: Vec<String>,
    pushes: Vec<PushRecord>,
    pulls: usize,
    rebuilds: usize,
    remote: bool,
    pending_edits: bool,
    fail_push: bool,
    emit_fault: Option<EmitFault>,
    crash_after: Option<usize>,
    watch_state: Option<PathBuf>,
}

impl MemoryHistory {
    /// A history with a remote configured.
    #[must_use]
    pub fn new() -> Self {
        Self {
            remote: true,
            pending_edits: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn without_remote() -> Self {
        Self {
            remote: false,
            pending_edits: true,
            ..Self::default()
        }
    }

    /// Fail emission for `attribution` after `allow` commits have landed.
    pub fn fail_emit_for(&mut self, attribution: &str, allow: u32) {
        self.emit_fault = Some(EmitFault {
            attribution: attribution.to_string(),
            allow,
        });
    }

    /// Make every push fail.
    pub fn fail_pushes(&mut self) {
        self.fail_push = true;
    }

    /// Fail every emission once `total` mirror commits exist, simulating a
    /// process that dies mid-pass.
    pub fn crash_after(&mut self, total: usize) {
        self.crash_after = Some(total);
    }

    /// Clear any injected faults.
    pub fn heal(&mut self) {
        self.fail_push = false;
        self.emit_fault = None;
        self.crash_after = None;
    }

    /// Read this replay state file on every push.
    pub fn watch_state(&mut self, path: impl Into<PathBuf>) {
        self.watch_state = Some(path.into());
    }

    #[must_use]
    pub fn commits(&self) -> &[MirrorCommit] {
        &self.commits
    }

    /// Mirror commits for `(attribution, date)`.
    #[must_use]
    pub fn count_for(&self, attribution: &str, date: NaiveDate) -> usize {
        self.commits
            .iter()
            .filter(|c| c.attribution == attribution && c.date == date)
            .count()
    }

    #[must_use]
    pub fn pushes(&self) -> &[PushRecord] {
        &self.pushes
    }

    #[must_use]
    pub fn data_commits(&self) -> &[String] {
        &self.data_commits
    }

    #[must_use]
    pub const fn pulls(&self) -> usize {
        self.pulls
    }

    #[must_use]
    pub const fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    fn record_push(&mut self, force: bool) -> Result<(), CollabError> {
        if self.fail_push {
            return Err(CollabError::Command {
                program: "git".into(),
                args: "push".into(),
                stderr: "remote rejected".into(),
            });
        }
        let persisted_replayed = self.watch_state.as_deref().and_then(read_replayed_total);
        self.pushes.push(PushRecord {
            force,
            commits: self.commits.len(),
            persisted_replayed,
        });
        Ok(())
    }
}

fn read_replayed_total(path: &Path) -> Option<u64> {
    let raw = std::fs::read(path).ok()?;
    let state: ReplayState = serde_json::from_slice(&raw).ok()?;
    Some(
        state
            .replayed_counts
            .values()
            .flat_map(|dates| dates.values())
            .map(|&c| u64::from(c))
            .sum(),
    )
}

impl History for MemoryHistory {
    fn emit(&mut self, request: &EmitRequest<'_>) -> Result<(), CollabError> {
        let mut allowed = request.count;
        let mut reason = None;

        if let Some(fault) = self
            .emit_fault
            .as_mut()
            .filter(|f| f.attribution == request.attribution)
        {
            if fault.allow < allowed {
                allowed = fault.allow;
                reason = Some("injected emit fault");
            }
            fault.allow -= allowed;
        }
        if let Some(limit) = self.crash_after {
            let room = u32::try_from(limit.saturating_sub(self.commits.len())).unwrap_or(u32::MAX);
            if room < allowed {
                allowed = room;
                reason = Some("simulated crash");
            }
        }

        for (i, at) in request.timestamps().take(allowed as usize).enumerate() {
            let n = request.first + u32::try_from(i).unwrap_or(u32::MAX);
            self.commits.push(MirrorCommit {
                date: request.date,
                at,
                attribution: request.attribution.to_string(),
                message: request.message_for(n),
            });
        }

        match reason {
            None => Ok(()),
            Some(reason) => Err(CollabError::Emit {
                date: request.date,
                emitted: allowed,
                requested: request.count,
                reason: reason.to_string(),
            }),
        }
    }

    fn has_pending_edits(&self) -> Result<bool, CollabError> {
        Ok(self.pending_edits)
    }

    fn commit_paths(&mut self, message: &str, _paths: &[&Path]) -> Result<(), CollabError> {
        self.data_commits.push(message.to_string());
        Ok(())
    }

    fn has_remote(&self) -> bool {
        self.remote
    }

    fn pull(&mut self) -> Result<(), CollabError> {
        self.pulls += 1;
        Ok(())
    }

    fn push(&mut self) -> Result<(), CollabError> {
        self.record_push(false)
    }

    fn force_push(&mut self) -> Result<(), CollabError> {
        self.record_push(true)
    }

    fn reset_to_orphan(&mut self) -> Result<(), CollabError> {
        self.rebuilds += 1;
        self.previous = std::mem::take(&mut self.commits);
        Ok(())
    }

    fn delete_history(&mut self) -> Result<(), CollabError> {
        self.previous.clear();
        Ok(())
    }

    fn rename_to_main(&mut self) -> Result<(), CollabError> {
        Ok(())
    }
}

/// An [`ActivitySource`] serving fixed per-user day lists.
#[derive(Debug, Default)]
pub struct StaticSource {
    days: BTreeMap<String, Vec<DayCount>>,
    failing: bool,
    /// `(user, since)` of every `fetch` call.
    calls: RefCell<Vec<(String, Option<NaiveDate>)>>,
}

impl StaticSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_days(mut self, user: &str, days: &[(NaiveDate, u32)]) -> Self {
        self.days.insert(
            user.to_string(),
            days.iter().map(|&(d, c)| DayCount::new(d, c)).collect(),
        );
        self
    }

    /// Make every fetch fail.
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// `since` values passed to `fetch`, in call order.
    #[must_use]
    pub fn fetch_calls(&self) -> Vec<(String, Option<NaiveDate>)> {
        self.calls.borrow().clone()
    }

    fn lookup(&self, user: &str) -> Result<Vec<DayCount>, CollabError> {
        if self.failing {
            return Err(CollabError::Fetch(format!("no data for {user}")));
        }
        Ok(self.days.get(user).cloned().unwrap_or_default())
    }
}

impl ActivitySource for StaticSource {
    fn fetch_all(&self, user: &str) -> Result<Vec<DayCount>, CollabError> {
        Ok(filter_days(self.lookup(user)?, None))
    }

    fn fetch(&self, user: &str, since: Option<NaiveDate>) -> Result<Vec<DayCount>, CollabError> {
        self.calls.borrow_mut().push((user.to_string(), since));
        Ok(filter_days(self.lookup(user)?, since))
    }
}
