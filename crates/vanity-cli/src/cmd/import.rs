//! `vanity import <user>`: seed a record for someone who cannot run vanity.

use std::io::Write;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tracing::info;
use vanity_core::collab::ActivitySource;
use vanity_core::error::ErrorCode;
use vanity_core::sync::merge::merge_with_summary;

use super::{Context, Precondition};
use crate::github::{GhCli, ProfileScraper};
use crate::output::{pretty_kv, render};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// GitHub login whose public history to import.
    #[arg(value_name = "USER")]
    pub login: String,

    /// Read the public profile calendar instead of the GraphQL API.
    #[arg(long)]
    pub scrape: bool,
}

#[derive(Debug, Serialize)]
pub struct ImportOutput {
    pub user: String,
    pub method: &'static str,
    /// Days returned by the source.
    pub fetched_days: usize,
    /// Days in the saved record.
    pub days: usize,
    pub total: u64,
}

/// Execute `vanity import`.
pub fn run_import(args: &ImportArgs, ctx: &Context) -> Result<()> {
    ctx.require_repository()?;
    ctx.require_initialized()?;
    let gh = GhCli::new();
    let operator = ctx.operator(&gh)?;

    let out = if args.scrape {
        import_with(ctx, &operator, &args.login, &ProfileScraper::new(gh), "scrape", Utc::now())?
    } else {
        import_with(ctx, &operator, &args.login, &gh, "api", Utc::now())?
    };

    render(ctx.output, &out, |out, w| {
        if out.fetched_days == 0 {
            writeln!(w, "No contributions found for {}", out.user)?;
            if out.method == "api" {
                writeln!(w, "  Try `vanity import {} --scrape`", out.user)?;
            }
            return Ok(());
        }
        writeln!(w, "✓ Imported {} via {}", out.user, out.method)?;
        pretty_kv(w, "Days", out.days.to_string())?;
        pretty_kv(w, "Total", out.total.to_string())?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  1. Commit and push .vanity/{}.json", out.user)?;
        writeln!(w, "  2. Run `vanity sync` to mirror their contributions")
    })
}

/// Fetch `user`'s full history from `source` and merge it into their record.
///
/// An empty fetch leaves the record untouched.
pub fn import_with<S: ActivitySource>(
    ctx: &Context,
    operator: &str,
    user: &str,
    source: &S,
    method: &'static str,
    now: DateTime<Utc>,
) -> Result<ImportOutput> {
    let user = user.trim();
    if user == operator {
        return Err(Precondition::new(
            ErrorCode::InvalidArgument,
            format!("{user} is you; use `vanity sync` to record your own contributions"),
        )
        .into());
    }
    let contributions = ctx.contributions();
    contributions
        .path_for(user)
        .map_err(|err| Precondition::new(ErrorCode::InvalidArgument, err.to_string()))?;

    info!(user, method, "importing full history");
    let fetched = source
        .fetch_all(user)
        .with_context(|| format!("failed to fetch contributions for {user}"))?;

    let existing = contributions
        .load(user)
        .with_context(|| format!("failed to load record for {user}"))?;
    if fetched.is_empty() {
        info!(user, "nothing to import");
        return Ok(ImportOutput {
            user: user.to_string(),
            method,
            fetched_days: 0,
            days: existing.day_count(),
            total: existing.total(),
        });
    }

    let (record, summary) = merge_with_summary(&existing, &fetched, now);
    contributions
        .save(&record)
        .with_context(|| format!("failed to save record for {user}"))?;
    info!(user, added = summary.added, raised = summary.raised, "imported");

    Ok(ImportOutput {
        user: user.to_string(),
        method,
        fetched_days: fetched.len(),
        days: record.day_count(),
        total: record.total(),
    })
}
