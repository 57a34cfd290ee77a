//! `tally snapshot`: the read-only state projection, always JSON.

use anyhow::Result;
use std::io::{self, Write};
use std::path::Path;

use tally_core::config::ProjectConfig;
use tally_core::store::lock;

use super::open_store;

/// Execute `tally snapshot`.
pub fn run_snapshot(project_root: &Path, config: &ProjectConfig) -> Result<()> {
    let store = open_store(project_root, config)?;
    let snapshot = lock(&store).snapshot();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &snapshot)?;
    writeln!(out)?;
    Ok(())
}
