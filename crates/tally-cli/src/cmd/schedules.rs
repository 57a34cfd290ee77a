//! `tally schedules`: persisted delayed closures, soonest first.

use anyhow::{Context as _, Result};
use chrono::Utc;
use std::io::Write;
use std::path::Path;

use tally_core::config::ProjectConfig;
use tally_core::schedule::ScheduleBook;

use super::require_initialized;
use crate::output::{OutputMode, render};

/// Execute `tally schedules`.
pub fn run_schedules(output: OutputMode, project_root: &Path, config: &ProjectConfig) -> Result<()> {
    require_initialized(project_root)?;
    let path = config.schedules_path(project_root);
    let book = ScheduleBook::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    let pending = book.pending();
    let now = Utc::now();

    render(output, &pending, |records, w| {
        if records.is_empty() {
            return writeln!(w, "No scheduled closures");
        }
        for record in records {
            let state = if record.close_time <= now { "overdue" } else { "armed" };
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}",
                record.thread_id,
                record.close_time.format("%Y-%m-%d %H:%M UTC"),
                state,
                record.requested_by,
                record.reason
            )?;
        }
        Ok(())
    })
}
