//! Git integration for vanity.
//!
//! [`GitRepo`] realises the core [`History`] trait by shelling out to the
//! `git` binary in the repository root.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};
use vanity_core::collab::{CollabError, EmitRequest, History};
use vanity_core::config::SyncConfig;

/// Temporary branch used while history is rebuilt.
const REBUILD_BRANCH: &str = "vanity-rebuild";

/// A working copy plus the branch and remote that sync publishes to.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    branch: String,
    remote: String,
}

impl GitRepo {
    pub fn new(root: impl Into<PathBuf>, sync: &SyncConfig) -> Self {
        Self {
            root: root.into(),
            branch: sync.branch.clone(),
            remote: sync.remote.clone(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, CollabError> {
        self.git_with_env(args, &[])
    }

    fn git_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<String, CollabError> {
        debug!(?args, "git");
        let output = Command::new("git")
            .args(args)
            .envs(envs.iter().copied())
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    CollabError::NotFound {
                        program: "git".to_string(),
                    }
                } else {
                    CollabError::Io(err)
                }
            })?;

        if !output.status.success() {
            return Err(CollabError::Command {
                program: "git".to_string(),
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn branch_ref(&self) -> String {
        format!("HEAD:refs/heads/{}", self.branch)
    }
}

impl History for GitRepo {
    fn emit(&mut self, request: &EmitRequest<'_>) -> Result<(), CollabError> {
        for (n, at) in (request.first..).zip(request.timestamps()) {
            let stamp = at.format("%Y-%m-%dT%H:%M:%S").to_string();
            let message = request.message_for(n);
            let result = self.git_with_env(
                &["commit", "--allow-empty", "--no-verify", "-q", "-m", message.as_str()],
                &[("GIT_AUTHOR_DATE", stamp.as_str()), ("GIT_COMMITTER_DATE", stamp.as_str())],
            );
            if let Err(err) = result {
                return Err(CollabError::Emit {
                    date: request.date,
                    emitted: n - request.first,
                    requested: request.count,
                    reason: err.to_string(),
                });
            }
        }
        Ok(())
    }

    fn has_pending_edits(&self) -> Result<bool, CollabError> {
        Ok(!self.git(&["status", "--porcelain"])?.trim().is_empty())
    }

    fn commit_paths(&mut self, message: &str, paths: &[&Path]) -> Result<(), CollabError> {
        let mut add = vec!["add".to_string(), "--".to_string()];
        add.extend(paths.iter().map(|p| p.display().to_string()));
        let add: Vec<&str> = add.iter().map(String::as_str).collect();
        self.git(&add)?;
        self.git(&["commit", "--no-verify", "-q", "-m", message])?;
        Ok(())
    }

    fn has_remote(&self) -> bool {
        self.git(&["remote"])
            .is_ok_and(|out| out.lines().any(|name| name.trim() == self.remote))
    }

    fn pull(&mut self) -> Result<(), CollabError> {
        info!(remote = %self.remote, branch = %self.branch, "pulling");
        self.git(&["pull", "--rebase", "-q", self.remote.as_str(), self.branch.as_str()])?;
        Ok(())
    }

    fn push(&mut self) -> Result<(), CollabError> {
        info!(remote = %self.remote, branch = %self.branch, "pushing");
        self.git(&["push", "-q", self.remote.as_str(), self.branch_ref().as_str()])?;
        Ok(())
    }

    fn force_push(&mut self) -> Result<(), CollabError> {
        info!(remote = %self.remote, branch = %self.branch, "force pushing");
        self.git(&["push", "-q", "--force", self.remote.as_str(), self.branch_ref().as_str()])?;
        Ok(())
    }

    fn reset_to_orphan(&mut self) -> Result<(), CollabError> {
        self.git(&["checkout", "-q", "--orphan", REBUILD_BRANCH])?;
        Ok(())
    }

    fn delete_history(&mut self) -> Result<(), CollabError> {
        self.git(&["branch", "-D", self.branch.as_str()])?;
        Ok(())
    }

    fn rename_to_main(&mut self) -> Result<(), CollabError> {
        self.git(&["branch", "-m", self.branch.as_str()])?;
        Ok(())
    }
}
