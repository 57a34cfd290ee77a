//! `tally stats`: staff leaderboard and ticket tag counts.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use tally_core::config::ProjectConfig;
use tally_core::contrib::LeaderboardEntry;
use tally_core::store::lock;
use tally_core::tags::TagStatistics;

use super::{display_name, open_store, staff_names};
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub leaderboard: Vec<LeaderboardEntry>,
    pub open_tickets: usize,
    pub tags: TagStatistics,
}

/// Execute `tally stats`.
pub fn run_stats(output: OutputMode, project_root: &Path, config: &ProjectConfig) -> Result<()> {
    let store = open_store(project_root, config)?;
    let report = {
        let store = lock(&store);
        StatsReport {
            leaderboard: store.leaderboard(&config.roster_ids()),
            open_tickets: store.data().contributions.len(),
            tags: store.tag_statistics(),
        }
    };
    let names = staff_names(config);

    render_mode(
        output,
        &report,
        |r, w| {
            for row in &r.leaderboard {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    row.staff_id, row.total_tickets, row.monthly_tickets, row.active_tickets
                )?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, "Leaderboard")?;
            writeln!(w, "{:<20} {:>6} {:>8} {:>7}", "Staff", "Total", "Monthly", "Active")?;
            for row in &r.leaderboard {
                writeln!(
                    w,
                    "{:<20} {:>6} {:>8} {:>7}",
                    display_name(&names, &row.staff_id),
                    row.total_tickets,
                    row.monthly_tickets,
                    row.active_tickets
                )?;
            }
            writeln!(w)?;
            pretty_section(w, &format!("Open tickets: {}", r.open_tickets))?;
            for (level, count) in &r.tags.priorities {
                writeln!(w, "priority {:<12} {count}", level.as_str())?;
            }
            for (category, count) in &r.tags.categories {
                writeln!(w, "category {:<12} {count}", category.as_str())?;
            }
            writeln!(w, "untagged {:<12} {}", "", r.tags.untagged)
        },
    )
}
