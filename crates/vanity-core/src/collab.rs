//! Interfaces to the two external collaborators: the version-control
//! history that receives mirror commits, and the activity source that
//! reports per-day contribution counts.
//!
//! Both are synchronous and opaque. Retries, timeouts, and authentication
//! belong to the implementations.

use std::io;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::ErrorCode;
use crate::model::DayCount;

/// Failures reported by an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    /// A spawned tool exited unsuccessfully.
    #[error("`{program} {args}` failed: {stderr}")]
    Command {
        program: String,
        args: String,
        stderr: String,
    },

    /// The tool could not be started at all.
    #[error("`{program}` not found on PATH")]
    NotFound { program: String },

    /// Mirror commit creation stopped part-way through a request.
    #[error("created {emitted} of {requested} mirror commits for {date}: {reason}")]
    Emit {
        date: NaiveDate,
        emitted: u32,
        requested: u32,
        reason: String,
    },

    /// The activity source could not produce counts.
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CollabError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Emit { .. } => ErrorCode::EmitFailed,
            Self::Fetch(_) => ErrorCode::FetchFailed,
            Self::Command { .. } | Self::NotFound { .. } | Self::Io(_) => {
                ErrorCode::InternalUnexpected
            }
        }
    }

    /// Number of commits that did land before the failure.
    #[must_use]
    pub const fn partially_emitted(&self) -> u32 {
        match self {
            Self::Emit { emitted, .. } => *emitted,
            _ => 0,
        }
    }
}

/// One contiguous run of mirror commits for a single (source, date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitRequest<'a> {
    pub date: NaiveDate,
    /// Source user the commits are attributed to.
    pub attribution: &'a str,
    /// Index of the first commit within the day (number already mirrored).
    pub first: u32,
    /// Commits to create in this request.
    pub count: u32,
    /// The source's recorded count for the day.
    pub day_total: u32,
}

impl EmitRequest<'_> {
    /// Hours between consecutive mirror commits on the same day.
    pub const HOUR_STEP: u32 = 2;

    /// Backdated timestamp for the `n`th commit of the whole day.
    ///
    /// Commits land every [`Self::HOUR_STEP`] hours and wrap after 24 hours.
    #[must_use]
    pub fn timestamp_for(date: NaiveDate, n: u32) -> NaiveDateTime {
        let hour = (n.wrapping_mul(Self::HOUR_STEP)) % 24;
        date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
    }

    /// Timestamps for every commit in this request, in order.
    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        (self.first..self.first + self.count).map(|n| Self::timestamp_for(self.date, n))
    }

    /// Commit message for the `n`th commit of the day (0-based).
    #[must_use]
    pub fn message_for(&self, n: u32) -> String {
        format!(
            "vanity: mirror from {} ({}/{})",
            self.attribution,
            n + 1,
            self.day_total
        )
    }
}

/// The local history that mirror commits are appended to.
pub trait History {
    /// Append `request.count` empty backdated commits.
    ///
    /// On failure the error should say how many commits were created
    /// (see [`CollabError::Emit`]).
    fn emit(&mut self, request: &EmitRequest<'_>) -> Result<(), CollabError>;

    /// Whether the working copy has uncommitted changes.
    fn has_pending_edits(&self) -> Result<bool, CollabError>;

    /// Stage `paths` and record a normal (non-backdated) commit.
    fn commit_paths(&mut self, message: &str, paths: &[&Path]) -> Result<(), CollabError>;

    fn has_remote(&self) -> bool;

    fn pull(&mut self) -> Result<(), CollabError>;

    fn push(&mut self) -> Result<(), CollabError>;

    /// Overwrite the remote branch with local history.
    fn force_push(&mut self) -> Result<(), CollabError>;

    /// Start a parentless branch with an empty history; the working tree is
    /// left in place.
    fn reset_to_orphan(&mut self) -> Result<(), CollabError>;

    /// Delete the previous main history.
    fn delete_history(&mut self) -> Result<(), CollabError>;

    /// Make the orphan branch the new main.
    fn rename_to_main(&mut self) -> Result<(), CollabError>;
}

/// A source of per-day contribution counts.
///
/// Implementations drop zero-count days before returning.
pub trait ActivitySource {
    /// Complete history since the account was created.
    fn fetch_all(&self, user: &str) -> Result<Vec<DayCount>, CollabError>;

    /// Recent history, keeping only dates strictly after `since` when given.
    fn fetch(&self, user: &str, since: Option<NaiveDate>) -> Result<Vec<DayCount>, CollabError>;
}

/// Drop zero-count days and any day on or before `since`.
#[must_use]
pub fn filter_days(days: Vec<DayCount>, since: Option<NaiveDate>) -> Vec<DayCount> {
    days.into_iter()
        .filter(|d| d.count > 0)
        .filter(|d| since.is_none_or(|s| d.date > s))
        .collect()
}
