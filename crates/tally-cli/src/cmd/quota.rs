//! `tally quota`: quota period management and reporting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tally_core::config::ProjectConfig;
use tally_core::model::{QuotaHistoryEntry, StaffId};
use tally_core::quota::{QuotaPeriods, Standing, next_rollover, render_percentage};
use tally_core::store::lock;

use super::{acquire_lock, display_name, open_store, staff_names};
use crate::offline::OfflinePlatform;
use crate::output::{OutputMode, pretty_kv, pretty_section, render, render_mode};

#[derive(Subcommand, Debug)]
pub enum QuotaCommand {
    /// Start a quota period with a monthly ticket target.
    Start {
        #[arg(allow_negative_numbers = true)]
        target: i64,

        /// Also zero every staff member's monthly count.
        #[arg(long)]
        reset: bool,
    },
    /// End the active period and archive each staff member's result.
    End,
    /// Zero every staff member's monthly count.
    Reset,
    /// Show progress against the active period.
    Status,
    /// Show finished periods, oldest first.
    History {
        /// Number of most recent periods to show.
        #[arg(long, default_value_t = 12)]
        limit: usize,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PeriodView {
    target: u32,
    start_date: DateTime<Utc>,
    next_rollover: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    #[serde(flatten)]
    period: PeriodView,
    standings: Vec<Standing>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow {
    id: String,
    #[serde(flatten)]
    entry: QuotaHistoryEntry,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetView {
    reset: usize,
}

pub async fn run_quota(
    command: &QuotaCommand,
    output: OutputMode,
    project_root: &Path,
    config: &ProjectConfig,
) -> Result<()> {
    match command {
        QuotaCommand::Start { target, reset } => {
            start(*target, *reset, output, project_root, config).await
        }
        QuotaCommand::End => end(output, project_root, config).await,
        QuotaCommand::Reset => reset(output, project_root, config),
        QuotaCommand::Status => status(output, project_root, config),
        QuotaCommand::History { limit } => history(*limit, output, project_root, config),
    }
}

fn periods(
    project_root: &Path,
    config: &ProjectConfig,
) -> Result<QuotaPeriods<OfflinePlatform>> {
    let store = open_store(project_root, config)?;
    let platform = Arc::new(OfflinePlatform::new(config.staff.members.clone()));
    Ok(QuotaPeriods::new(store, platform, config.quota_settings()))
}

async fn start(
    target: i64,
    reset: bool,
    output: OutputMode,
    project_root: &Path,
    config: &ProjectConfig,
) -> Result<()> {
    let _lock = acquire_lock(project_root)?;
    let state = periods(project_root, config)?.start(target, reset).await?;
    let view = PeriodView {
        target: state.target,
        start_date: state.start_date,
        next_rollover: next_rollover(state.start_date),
    };
    render(output, &view, |v, w| {
        writeln!(w, "Started quota period: {} tickets", v.target)?;
        pretty_kv(w, "Started", v.start_date.format("%Y-%m-%d %H:%M UTC").to_string())
    })
}

async fn end(output: OutputMode, project_root: &Path, config: &ProjectConfig) -> Result<()> {
    let _lock = acquire_lock(project_root)?;
    let entry = periods(project_root, config)?.end().await?;
    let names = staff_names(config);
    render(output, &entry, |e, w| {
        writeln!(
            w,
            "Ended quota period {} to {} (target {})",
            e.start_date.format("%Y-%m-%d"),
            e.end_date.format("%Y-%m-%d"),
            e.target
        )?;
        write_results(w, e, &names)
    })
}

fn reset(output: OutputMode, project_root: &Path, config: &ProjectConfig) -> Result<()> {
    let _lock = acquire_lock(project_root)?;
    let store = open_store(project_root, config)?;
    let view = ResetView {
        reset: lock(&store).reset_monthly_stats()?,
    };
    render(output, &view, |v, w| {
        writeln!(w, "Reset monthly counts for {} staff", v.reset)
    })
}

fn status(output: OutputMode, project_root: &Path, config: &ProjectConfig) -> Result<()> {
    let store = open_store(project_root, config)?;
    let (state, standings) = lock(&store).standings(&config.roster_ids())?;
    let view = StatusView {
        period: PeriodView {
            target: state.target,
            start_date: state.start_date,
            next_rollover: next_rollover(Utc::now()),
        },
        standings,
    };
    let names = staff_names(config);

    render_mode(
        output,
        &view,
        |v, w| {
            for row in &v.standings {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    row.staff_id,
                    row.monthly_tickets,
                    v.period.target,
                    render_percentage(row.percentage)
                )?;
            }
            Ok(())
        },
        |v, w| {
            pretty_section(w, "Quota Period")?;
            pretty_kv(w, "Target", v.period.target.to_string())?;
            pretty_kv(w, "Started", v.period.start_date.format("%Y-%m-%d").to_string())?;
            pretty_kv(w, "Rollover", v.period.next_rollover.format("%Y-%m-%d").to_string())?;
            writeln!(w)?;
            pretty_section(w, "Standings")?;
            for row in &v.standings {
                writeln!(
                    w,
                    "{:<20} {:>4}/{:<4} {:>7}",
                    display_name(&names, &row.staff_id),
                    row.monthly_tickets,
                    v.period.target,
                    render_percentage(row.percentage)
                )?;
            }
            Ok(())
        },
    )
}

fn history(
    limit: usize,
    output: OutputMode,
    project_root: &Path,
    config: &ProjectConfig,
) -> Result<()> {
    let store = open_store(project_root, config)?;
    let rows: Vec<HistoryRow> = lock(&store)
        .quota_history(limit)
        .into_iter()
        .map(|(id, entry)| HistoryRow { id, entry })
        .collect();
    let names = staff_names(config);

    render(output, &rows, |rows, w| {
        if rows.is_empty() {
            return writeln!(w, "No finished quota periods");
        }
        for row in rows {
            pretty_section(
                w,
                &format!(
                    "{} to {} (target {})",
                    row.entry.start_date.format("%Y-%m-%d"),
                    row.entry.end_date.format("%Y-%m-%d"),
                    row.entry.target
                ),
            )?;
            write_results(w, &row.entry, &names)?;
            writeln!(w)?;
        }
        Ok(())
    })
}

fn write_results(
    w: &mut dyn Write,
    entry: &QuotaHistoryEntry,
    names: &BTreeMap<StaffId, String>,
) -> std::io::Result<()> {
    for (staff, result) in &entry.staff_results {
        writeln!(
            w,
            "{:<20} {:>4}/{:<4} {:>7}",
            display_name(names, staff),
            result.monthly_tickets,
            entry.target,
            render_percentage(result.percentage_achieved)
        )?;
    }
    Ok(())
}
