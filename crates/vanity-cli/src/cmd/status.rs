//! `vanity status`: who is in the repository and how far mirroring got.
//!
//! Read-only. Works without a resolvable identity; the operator section is
//! simply omitted.

use std::io::Write;

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use serde::Serialize;

use super::Context;
use crate::github::GhCli;
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct StatusArgs {}

#[derive(Debug, Serialize)]
pub struct UserStatus {
    pub user: String,
    pub is_operator: bool,
    /// Days with at least one recorded contribution.
    pub days: usize,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_day: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Mirror progress for one collaborator, from the operator's point of view.
#[derive(Debug, Serialize)]
pub struct MirrorStatus {
    pub source: String,
    pub dates: usize,
    pub commits: u64,
    /// Recorded contributions not yet mirrored.
    pub owed: u64,
}

#[derive(Debug, Serialize)]
pub struct OperatorStatus {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    pub mirrored: Vec<MirrorStatus>,
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub users: Vec<UserStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<OperatorStatus>,
}

/// Execute `vanity status`.
pub fn run_status(_args: &StatusArgs, ctx: &Context) -> Result<()> {
    ctx.require_initialized()?;

    let operator = match ctx.operator(&GhCli::new()) {
        Ok(login) => Some(login),
        Err(err) => {
            tracing::debug!(error = %format!("{err:#}"), "status without an operator");
            None
        }
    };
    let out = collect_status(ctx, operator.as_deref())?;

    render_mode(
        ctx.output,
        &out,
        |out, w| {
            for user in &out.users {
                writeln!(
                    w,
                    "user={} operator={} days={} total={}",
                    user.user, user.is_operator, user.days, user.total
                )?;
            }
            if let Some(op) = &out.operator {
                for m in &op.mirrored {
                    writeln!(
                        w,
                        "mirrored source={} dates={} commits={} owed={}",
                        m.source, m.dates, m.commits, m.owed
                    )?;
                }
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, "Users")?;
            if out.users.is_empty() {
                writeln!(w, "No contribution records yet. Run `vanity sync` first.")?;
            }
            for user in &out.users {
                let marker = if user.is_operator { " (you)" } else { "" };
                let latest = user
                    .latest_day
                    .map_or_else(|| "-".to_string(), |d| d.to_string());
                writeln!(
                    w,
                    "  {}{marker}: {} contributions over {} days, latest {latest}",
                    user.user, user.total, user.days
                )?;
            }

            if let Some(op) = &out.operator {
                writeln!(w)?;
                pretty_section(w, &format!("Mirrored by {}", op.user))?;
                let last = op
                    .last_sync
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
                pretty_kv(w, "Last sync", last)?;
                for m in &op.mirrored {
                    writeln!(
                        w,
                        "  {}: {} commits over {} days ({} owed)",
                        m.source, m.commits, m.dates, m.owed
                    )?;
                }
            }
            Ok(())
        },
    )
}

/// Gather status from the stores. `operator` adds the mirroring section.
pub fn collect_status(ctx: &Context, operator: Option<&str>) -> Result<StatusOutput> {
    let contributions = ctx.contributions();
    let users = contributions
        .list_known_users()
        .context("failed to list contribution records")?;

    let mut rows = Vec::with_capacity(users.len());
    let mut records = Vec::with_capacity(users.len());
    for user in &users {
        let record = contributions
            .load(user)
            .with_context(|| format!("failed to load record for {user}"))?;
        rows.push(UserStatus {
            user: user.clone(),
            is_operator: operator == Some(user.as_str()),
            days: record.day_count(),
            total: record.total(),
            latest_day: record.latest_day(),
            last_updated: record.last_updated,
        });
        records.push(record);
    }

    let operator = match operator {
        Some(login) => {
            let state = ctx
                .states()
                .load(login)
                .context("failed to load replay state")?;
            let mirrored = records
                .iter()
                .filter(|r| r.owner != login)
                .map(|record| {
                    let owed = record
                        .iter_days()
                        .map(|d| {
                            u64::from(
                                d.count
                                    .saturating_sub(state.get_replayed(&record.owner, d.date)),
                            )
                        })
                        .sum();
                    MirrorStatus {
                        source: record.owner.clone(),
                        dates: state.replayed_dates(&record.owner),
                        commits: state.replayed_total(&record.owner),
                        owed,
                    }
                })
                .collect();
            Some(OperatorStatus {
                user: login.to_string(),
                last_sync: state.last_sync,
                mirrored,
            })
        }
        None => None,
    };

    Ok(StatusOutput {
        users: rows,
        operator,
    })
}
