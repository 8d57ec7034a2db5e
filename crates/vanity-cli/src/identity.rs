//! Operator identity resolution for CLI commands.
//!
//! The resolution chain: `--user` flag > `VANITY_USER` env > user config
//! `user` > `gh api user`.

use std::env;

use vanity_core::collab::CollabError;
use vanity_core::config::UserConfig;
use vanity_core::error::ErrorCode;

use crate::cmd::Precondition;
use crate::github::GhCli;

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

fn resolve_user_with(
    cli_flag: Option<&str>,
    env: &dyn EnvReader,
    config: &UserConfig,
    lookup: impl FnOnce() -> Result<String, CollabError>,
) -> Result<String, Precondition> {
    if let Some(user) = cli_flag.map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(user.to_string());
    }

    if let Some(user) = env.get("VANITY_USER") {
        return Ok(user.trim().to_string());
    }

    if let Some(user) = config.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(user.to_string());
    }

    match lookup() {
        Ok(login) if !login.trim().is_empty() => Ok(login.trim().to_string()),
        Ok(_) => Err(Precondition::new(
            ErrorCode::IdentityUnavailable,
            "GitHub CLI returned an empty login",
        )),
        Err(err) => Err(Precondition::new(
            ErrorCode::IdentityUnavailable,
            format!("could not ask the GitHub CLI who you are: {err}"),
        )),
    }
}

/// Resolve the operator, asking `gh` only when nothing local names one.
pub fn resolve_user(
    cli_flag: Option<&str>,
    config: &UserConfig,
    gh: &GhCli,
) -> Result<String, Precondition> {
    resolve_user_with(cli_flag, &RealEnv, config, || gh.current_user())
}
