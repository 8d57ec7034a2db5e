//! Persisted data model: per-user contribution records and the operator's
//! replay state.

pub mod contribution;
pub mod replay_state;

pub use contribution::{ContributionRecord, DayCount};
pub use replay_state::{DateCounts, ReplayState};
