#![forbid(unsafe_code)]

mod cmd;
mod offline;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::path::Path;
use tally_core::config::load_project_config;
use tally_core::error::TallyError;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tally: support-ticket credit and quota bookkeeping",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Initialize tally state in the current directory",
        after_help = "EXAMPLES:\n    # Create .tally/ with a config template and empty state\n    tally init\n\n    # Rewrite the config template\n    tally init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        about = "Manage quota periods",
        after_help = "EXAMPLES:\n    # Start a 20-ticket period and zero monthly counts\n    tally quota start 20 --reset\n\n    # Progress against the active period\n    tally quota status\n\n    # Close the period and archive results\n    tally quota end --json"
    )]
    Quota {
        #[command(subcommand)]
        command: cmd::quota::QuotaCommand,
    },

    #[command(
        about = "Show the staff leaderboard and tag counts",
        after_help = "EXAMPLES:\n    tally stats\n    tally stats --json"
    )]
    Stats,

    #[command(
        about = "List persisted delayed closures",
        after_help = "EXAMPLES:\n    tally schedules --json"
    )]
    Schedules,

    #[command(about = "Print the read-only state projection as JSON")]
    Snapshot,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "tally=debug,tally_core=debug,info"
        } else {
            "tally=info,tally_core=info,warn"
        })
    });

    let format = env::var("TALLY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

async fn run(command: &Commands, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Init(args) => cmd::init::run_init(args, output, project_root),
        Commands::Quota { command } => {
            let config = load_project_config(project_root)?;
            cmd::quota::run_quota(command, output, project_root, &config).await
        }
        Commands::Stats => {
            cmd::stats::run_stats(output, project_root, &load_project_config(project_root)?)
        }
        Commands::Schedules => {
            cmd::schedules::run_schedules(output, project_root, &load_project_config(project_root)?)
        }
        Commands::Snapshot => {
            cmd::snapshot::run_snapshot(project_root, &load_project_config(project_root)?)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = env::current_dir()?;
    let output = cli.output_mode();
    debug!(root = %project_root.display(), ?output, "starting");

    let command_result = run(&cli.command, output, &project_root).await;

    match command_result {
        Ok(()) => {
            info!("done");
            Ok(())
        }
        Err(err) => {
            let cli_error = err
                .downcast_ref::<TallyError>()
                .map_or_else(|| CliError::new(format!("{err:#}")), CliError::from);
            render_error(output, &cli_error)?;
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmd::quota::QuotaCommand;

    #[test]
    fn json_flag_parses_before_and_after_subcommand() {
        let cli = Cli::parse_from(["tally", "--json", "stats"]);
        assert!(cli.json);
        assert!(cli.output_mode().is_json());

        let cli = Cli::parse_from(["tally", "stats", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn quota_start_parses_target_and_reset() {
        let cli = Cli::parse_from(["tally", "quota", "start", "20", "--reset"]);
        assert!(matches!(
            cli.command,
            Commands::Quota {
                command: QuotaCommand::Start {
                    target: 20,
                    reset: true
                }
            }
        ));
    }

    #[test]
    fn negative_targets_reach_validation() {
        let cli = Cli::parse_from(["tally", "quota", "start", "-5"]);
        assert!(matches!(
            cli.command,
            Commands::Quota {
                command: QuotaCommand::Start { target: -5, .. }
            }
        ));
    }

    #[test]
    fn history_limit_defaults_to_twelve() {
        let cli = Cli::parse_from(["tally", "quota", "history"]);
        assert!(matches!(
            cli.command,
            Commands::Quota {
                command: QuotaCommand::History { limit: 12 }
            }
        ));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["tally", "init"],
            vec!["tally", "init", "--force"],
            vec!["tally", "quota", "start", "10"],
            vec!["tally", "quota", "end"],
            vec!["tally", "quota", "reset"],
            vec!["tally", "quota", "status"],
            vec!["tally", "quota", "history", "--limit", "3"],
            vec!["tally", "stats"],
            vec!["tally", "schedules"],
            vec!["tally", "snapshot"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "Failed to parse: {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn verbose_flag_is_global() {
        let cli = Cli::parse_from(["tally", "quota", "status", "-v"]);
        assert!(cli.verbose);
    }
}
