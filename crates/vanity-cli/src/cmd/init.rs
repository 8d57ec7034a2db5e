use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::Write as _;
use std::path::Path;
use vanity_core::config::{CONFIG_FILE, default_project_config_toml};

use super::Context;
use crate::output::{pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {}

const GITIGNORE: &str = "sync.lock\n*.tmp\n";

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub data_dir: String,
    /// Files written by this run; existing files are left alone.
    pub created: Vec<String>,
}

/// Execute `vanity init`. Creates the data directory:
///
/// ```text
/// .vanity/
///   .gitkeep
///   .gitignore    (sync.lock, *.tmp)
///   config.toml   (default [sync] settings)
/// ```
///
/// Rerunning is safe: only missing files are written.
///
/// # Errors
///
/// Returns an error outside a git repository or if any filesystem operation
/// fails.
pub fn run_init(_args: &InitArgs, ctx: &Context) -> Result<()> {
    ctx.require_repository()?;

    let data_dir = ctx.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let default_config = default_project_config_toml();
    let files = [
        (".gitkeep", ""),
        (".gitignore", GITIGNORE),
        (CONFIG_FILE, default_config.as_str()),
    ];

    let mut created = Vec::new();
    for (name, contents) in files {
        if write_if_missing(&data_dir.join(name), contents)? {
            created.push(name.to_string());
        }
    }
    tracing::info!(dir = %data_dir.display(), created = created.len(), "initialized");

    let out = InitOutput {
        data_dir: data_dir.display().to_string(),
        created,
    };
    render(ctx.output, &out, |out, w| {
        writeln!(w, "✓ Initialized vanity in {}", out.data_dir)?;
        if !out.created.is_empty() {
            pretty_kv(w, "Created", out.created.join(", "))?;
        }
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  1. Invite collaborators to this repository")?;
        writeln!(w, "  2. Run `vanity sync` to sync your contributions")
    })
}

fn write_if_missing(path: &Path, contents: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputMode;
    use std::fs;
    use vanity_core::error::ErrorCode;

    fn ctx(root: &Path) -> Context {
        Context {
            project_root: root.to_path_buf(),
            output: OutputMode::Json,
            user_flag: None,
        }
    }

    #[test]
    fn fresh_init_creates_structure() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join(".git")).expect("fake git dir");

        run_init(&InitArgs {}, &ctx(dir.path())).expect("init");

        let data = dir.path().join(".vanity");
        assert!(data.join(".gitkeep").is_file());
        assert_eq!(
            fs::read_to_string(data.join(".gitignore")).expect("read"),
            "sync.lock\n*.tmp\n"
        );
        assert!(
            fs::read_to_string(data.join("config.toml"))
                .expect("read")
                .contains("batch_size = 100")
        );
    }

    #[test]
    fn rerun_keeps_existing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join(".git")).expect("fake git dir");
        let data = dir.path().join(".vanity");
        fs::create_dir_all(&data).expect("mkdir");
        fs::write(data.join("config.toml"), "[sync]\nbatch_size = 5\n").expect("write");

        run_init(&InitArgs {}, &ctx(dir.path())).expect("init");

        assert_eq!(
            fs::read_to_string(data.join("config.toml")).expect("read"),
            "[sync]\nbatch_size = 5\n"
        );
        assert!(data.join(".gitignore").is_file());
    }

    #[test]
    fn init_outside_repository_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run_init(&InitArgs {}, &ctx(dir.path())).expect_err("must fail");
        let precondition = err.downcast_ref::<crate::cmd::Precondition>().expect("precondition");
        assert_eq!(precondition.code, ErrorCode::NotARepository);
        assert!(!dir.path().join(".vanity").exists());
    }
}
