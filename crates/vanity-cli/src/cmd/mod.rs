//! Subcommand handlers and the preconditions they share.

pub mod import;
pub mod init;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use vanity_core::config::{ProjectConfig, UserConfig, load_project_config, load_user_config};
use vanity_core::error::ErrorCode;
use vanity_core::store::{ContributionStore, ReplayStateStore, data_dir};

use crate::github::GhCli;
use crate::identity;
use crate::output::OutputMode;

/// A failed precondition, checked before any work starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub code: ErrorCode,
    pub message: String,
}

impl Precondition {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Precondition {}

/// Per-invocation settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub project_root: PathBuf,
    pub output: OutputMode,
    /// Login given with `--user`.
    pub user_flag: Option<String>,
}

impl Context {
    pub fn data_dir(&self) -> PathBuf {
        data_dir(&self.project_root)
    }

    pub fn contributions(&self) -> ContributionStore {
        ContributionStore::new(self.data_dir())
    }

    pub fn states(&self) -> ReplayStateStore {
        ReplayStateStore::new(self.data_dir())
    }

    pub fn require_repository(&self) -> Result<(), Precondition> {
        if is_repository(&self.project_root) {
            Ok(())
        } else {
            Err(Precondition::new(
                ErrorCode::NotARepository,
                format!(
                    "{} is not a git repository",
                    self.project_root.display()
                ),
            ))
        }
    }

    pub fn require_initialized(&self) -> Result<(), Precondition> {
        if self.data_dir().is_dir() {
            Ok(())
        } else {
            Err(Precondition::new(
                ErrorCode::NotInitialized,
                "vanity not initialized (no .vanity/ directory)",
            ))
        }
    }

    pub fn project_config(&self) -> Result<ProjectConfig> {
        load_project_config(&self.project_root).map_err(|err| {
            err.context(Precondition::new(
                ErrorCode::ConfigParseError,
                "invalid project config",
            ))
        })
    }

    /// The operator's login: `--user`, then `VANITY_USER`, then the user
    /// config, then the GitHub CLI.
    pub fn operator(&self, gh: &GhCli) -> Result<String> {
        let user_config = load_user_config().unwrap_or_else(|err| {
            tracing::warn!(error = %format!("{err:#}"), "ignoring unreadable user config");
            UserConfig::default()
        });
        let login = identity::resolve_user(self.user_flag.as_deref(), &user_config, gh)
            .context("cannot determine who is syncing")?;
        tracing::debug!(operator = %login, "resolved operator");
        Ok(login)
    }
}

pub fn is_repository(root: &Path) -> bool {
    root.join(".git").exists()
}
