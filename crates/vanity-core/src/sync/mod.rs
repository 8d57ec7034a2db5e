//! Keeping the operator's mirror history in step with collaborators.
//!
//! [`merge`] folds freshly fetched day counts into a stored record;
//! [`reconcile`] turns other users' records into mirror commits.

pub mod merge;
pub mod reconcile;
