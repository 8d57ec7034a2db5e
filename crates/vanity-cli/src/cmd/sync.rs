//! `vanity sync`: refresh the operator's record, then mirror everyone else.
//!
//! Steps, in order:
//! 1. Preconditions (repository, initialized, identity) and the local lock.
//! 2. `git pull`, unless rebuilding or in a dry run. Failure is a warning.
//! 3. Fetch the operator's recent activity and merge it into their record.
//! 4. Optional history rebuild.
//! 5. Reconcile every other known user; persist, commit, push.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};
use vanity_core::collab::{ActivitySource, History};
use vanity_core::lock::SyncLock;
use vanity_core::sync::merge::{MergeSummary, merge_with_summary};
use vanity_core::sync::reconcile::{ReconcileConfig, ReconcileReport, Reconciler};

use super::Context;
use crate::git::GitRepo;
use crate::github::GhCli;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// How long to wait for another local sync to release the lock.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Show what would be mirrored without writing, committing, or pushing.
    #[arg(long)]
    pub dry_run: bool,

    /// Push every N mirror commits (overrides `[sync] batch_size`).
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Wipe commit history and mirror everything again from scratch.
    #[arg(long)]
    pub rebuild: bool,
}

/// Everything `vanity sync` did, for rendering.
#[derive(Debug, Serialize)]
pub struct SyncOutcome {
    pub operator: String,
    /// `since` passed to the activity source; `None` on a first sync.
    pub fetched_since: Option<NaiveDate>,
    pub fetched_days: usize,
    pub merge: MergeSummary,
    pub recorded_days: usize,
    pub pulled: bool,
    pub warnings: Vec<String>,
    pub reconcile: ReconcileReport,
}

/// Entry point wired from `main.rs`.
pub fn run_sync(args: &SyncArgs, ctx: &Context) -> Result<()> {
    ctx.require_repository()?;
    ctx.require_initialized()?;
    let config = ctx.project_config()?;
    let gh = GhCli::new();
    let operator = ctx.operator(&gh)?;

    let _lock = if args.dry_run {
        None
    } else {
        let path = ctx.data_dir().join("sync.lock");
        Some(SyncLock::acquire(&path, LOCK_TIMEOUT).context("another sync is running")?)
    };

    let batch_size = args.batch_size.unwrap_or(config.sync.batch_size);
    let mut repo = GitRepo::new(&ctx.project_root, &config.sync);
    let outcome = sync_with(ctx, args, batch_size, &operator, &mut repo, &gh, Utc::now())?;
    render_outcome(ctx.output, &outcome)?;

    if outcome.reconcile.failures().next().is_some() {
        warn!(
            failed = outcome.reconcile.failures().count(),
            "some collaborators were not fully mirrored; rerun `vanity sync` to retry"
        );
    }
    Ok(())
}

/// The sync pass itself, against any history and activity source.
pub fn sync_with<H: History, S: ActivitySource>(
    ctx: &Context,
    args: &SyncArgs,
    batch_size: usize,
    operator: &str,
    history: &mut H,
    source: &S,
    now: DateTime<Utc>,
) -> Result<SyncOutcome> {
    let contributions = ctx.contributions();
    let states = ctx.states();
    let mut warnings = Vec::new();

    let mut pulled = false;
    if !args.rebuild && !args.dry_run && history.has_remote() {
        match history.pull() {
            Ok(()) => pulled = true,
            Err(err) => {
                warn!(error = %err, "git pull failed; continuing with local data");
                warnings.push(format!("git pull: {err}"));
            }
        }
    }

    let mut state = states
        .load(operator)
        .context("failed to load replay state")?;

    // Same-day counts keep growing after a sync, so refetch from the day
    // before; overlapping days are overwritten, never added.
    let fetched_since = state
        .last_sync
        .and_then(|t| t.date_naive().checked_sub_days(Days::new(1)));
    info!(operator, since = ?fetched_since, "fetching own contributions");
    let fetched = source
        .fetch(operator, fetched_since)
        .context("failed to fetch your contributions")?;

    let existing = contributions
        .load(operator)
        .context("failed to load your contribution record")?;
    let (record, merge) = merge_with_summary(&existing, &fetched, now);
    if !args.dry_run {
        contributions
            .save(&record)
            .context("failed to save your contribution record")?;
    }
    info!(
        fetched = fetched.len(),
        added = merge.added,
        raised = merge.raised,
        total_days = record.day_count(),
        "updated own record"
    );

    let config = ReconcileConfig {
        dry_run: args.dry_run,
        batch_size,
        rebuild: args.rebuild,
    };
    let mut engine = Reconciler::new(&contributions, &states, history, config);
    if args.rebuild {
        engine
            .rebuild(&mut state)
            .context("history rebuild failed")?;
    }
    let reconcile = engine.run(&mut state, now).context("sync failed")?;

    Ok(SyncOutcome {
        operator: operator.to_string(),
        fetched_since,
        fetched_days: fetched.len(),
        merge,
        recorded_days: record.day_count(),
        pulled,
        warnings,
        reconcile,
    })
}

fn render_outcome(mode: OutputMode, outcome: &SyncOutcome) -> Result<()> {
    render_mode(
        mode,
        outcome,
        |o, w| {
            writeln!(
                w,
                "operator={} fetched_days={} emitted={} checkpoints={} pushed={} dry_run={}",
                o.operator,
                o.fetched_days,
                o.reconcile.emitted,
                o.reconcile.checkpoints,
                o.reconcile.pushed,
                o.reconcile.dry_run
            )?;
            for source in &o.reconcile.sources {
                writeln!(
                    w,
                    "source={} emitted={} dates={} regressions={}{}",
                    source.source,
                    source.emitted,
                    source.planned.len(),
                    source.regressions.len(),
                    source
                        .error
                        .as_deref()
                        .map(|e| format!(" error={e:?}"))
                        .unwrap_or_default()
                )?;
            }
            Ok(())
        },
        |o, w| {
            if o.reconcile.dry_run {
                writeln!(w, "Dry run: no changes will be made")?;
            }
            if o.reconcile.rebuild {
                writeln!(w, "Rebuild: history wiped, mirroring everything again")?;
            }
            pretty_section(w, &format!("Syncing as {}", o.operator))?;
            for warning in &o.warnings {
                writeln!(w, "warning: {warning}")?;
            }
            pretty_kv(w, "Fetched", format!("{} contribution days", o.fetched_days))?;
            pretty_kv(w, "Recorded", format!("{} days total", o.recorded_days))?;
            writeln!(w)?;

            for source in &o.reconcile.sources {
                for planned in &source.planned {
                    let verb = if o.reconcile.dry_run { "Would create" } else { "Created" };
                    writeln!(
                        w,
                        "  {verb} {} commits for {} from {} (had {}, now {})",
                        planned.owed, planned.date, source.source, planned.already, planned.target
                    )?;
                }
                for regression in &source.regressions {
                    writeln!(
                        w,
                        "  warning: {} on {} dropped to {} below {} mirrored",
                        source.source, regression.date, regression.recorded, regression.replayed
                    )?;
                }
                if let Some(error) = &source.error {
                    writeln!(w, "  warning: failed to mirror {}: {error}", source.source)?;
                }
            }

            writeln!(w)?;
            if o.reconcile.emitted > 0 {
                pretty_kv(w, "Mirrored", format!("{} commits", o.reconcile.emitted))?;
            } else {
                writeln!(w, "No new contributions to mirror")?;
            }
            if o.reconcile.checkpoints > 0 {
                pretty_kv(w, "Checkpoints", o.reconcile.checkpoints.to_string())?;
            }
            if o.reconcile.pushed {
                writeln!(w, "✓ Pushed")?;
            }
            writeln!(w, "✓ Sync complete")
        },
    )
}
