//! vanity-core library.
//!
//! Per-user contribution records, replay state, and the reconciliation
//! engine that mirrors other users' activity into the operator's history.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per module with a `code()` into
//!   [`error::ErrorCode`]; `anyhow::Result` at the config edge.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod collab;
pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod store;
pub mod sync;
pub mod testing;
