use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use tally_core::config::{ProjectConfig, TALLY_DIR, load_project_config};
use tally_core::schedule::ScheduleBook;
use tally_core::store::Store;

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the config template even if `.tally/` already exists.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "# Roster used by the CLI; the bot reads the staff role instead.\n\
    [[staff.members]]\n\
    id = \"000000000000000000\"\n\
    name = \"staff\"\n\
    \n\
    [platform]\n\
    # staff_role_id = \"\"\n\
    # announcement_channel_id = \"\"\n\
    # mod_log_channel_id = \"\"\n\
    \n\
    [quota]\n\
    default_target = 15\n\
    rollover = true\n\
    \n\
    [closure]\n\
    solved_tags = [\"solved\", \"closed\"]\n\
    roster_fallback = false\n";

#[derive(Debug, Serialize)]
struct InitReport {
    root: PathBuf,
    data: PathBuf,
    schedules: PathBuf,
    config_written: bool,
}

/// Execute `tally init`. Creates the project skeleton:
///
/// ```text
/// .tally/
///   config.toml               (template, kept unless --force)
///   data.json                 (empty state, existing state is kept)
///   scheduled_closures.json   (empty book, existing records are kept)
/// ```
///
/// # Errors
///
/// Returns an error if `.tally/` already exists and `--force` is not set,
/// or if any existing state file fails to parse.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let tally_dir = project_root.join(TALLY_DIR);

    if tally_dir.exists() && !args.force {
        anyhow::bail!(".tally/ already exists. Use `tally init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&tally_dir)
        .with_context(|| format!("Failed to create {}", tally_dir.display()))?;

    let config_path = tally_dir.join("config.toml");
    let config_written = args.force || !config_path.exists();
    if config_written {
        std::fs::write(&config_path, CONFIG_TOML)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    let config: ProjectConfig = load_project_config(project_root)?;
    let data = config.data_path(project_root);
    Store::load(&data).with_context(|| format!("Failed to initialize {}", data.display()))?;

    let schedules = config.schedules_path(project_root);
    let book = ScheduleBook::load(&schedules)
        .with_context(|| format!("Failed to read {}", schedules.display()))?;
    book.save()
        .with_context(|| format!("Failed to write {}", schedules.display()))?;

    let report = InitReport {
        root: project_root.to_path_buf(),
        data,
        schedules,
        config_written,
    };
    render(output, &report, |r, w| {
        writeln!(w, "Initialized tally in {}", r.root.display())?;
        pretty_kv(w, "State", r.data.display().to_string())?;
        pretty_kv(w, "Schedules", r.schedules.display().to_string())
    })
}
