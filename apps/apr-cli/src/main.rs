//! # apr-cli
//!
//! Command-line front end for access-policy reconciliation.
//!
//! - `apr evaluate` — evaluate one identity of a fixture directory and print
//!   the resulting change-set
//! - `apr profile show/history` — inspect stored policy profiles

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Access-policy reconciliation: compute provisioning changes for identities.
#[derive(Parser)]
#[command(name = "apr", version, about)]
struct Cli {
    /// Log evaluation details (debug level) to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one identity and print its account changes.
    Evaluate {
        /// Directory fixture (YAML, or JSON with a .json extension).
        #[arg(long)]
        fixture: PathBuf,
        /// Identity to evaluate.
        #[arg(long)]
        identity: String,
        /// Engine configuration (TOML). Defaults apply when absent.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keep policy profiles as JSON files in this directory instead of in memory.
        #[arg(long)]
        profile_dir: Option<PathBuf>,
        /// Output format.
        #[arg(long, value_enum, default_value = "text")]
        format: commands::OutputFormat,
    },
    /// Inspect stored policy profiles.
    Profile {
        #[command(subcommand)]
        command: commands::profile::ProfileCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they don't mix with the printed change-set.
    let level = if cli.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in ["apr_policy", "apr_changeset", "apr_store", "apr_engine", "apr_cli"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    match &cli.command {
        Commands::Evaluate {
            fixture,
            identity,
            config,
            profile_dir,
            format,
        } => commands::evaluate::execute(
            fixture,
            identity,
            config.as_deref(),
            profile_dir.as_deref(),
            *format,
        ),
        Commands::Profile { command } => commands::profile::execute(command),
    }
}
