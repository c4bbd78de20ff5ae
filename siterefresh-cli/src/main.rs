//! siterefresh: sync listing data and rebuild the static site.
//!
//! # Usage
//!
//! ```text
//! siterefresh run [-H key=value]... [--json] [--config <file>] [overrides]
//! siterefresh trigger [-H key=value]... [--json] [overrides]
//! siterefresh config [--json] [--config <file>] [overrides]
//! siterefresh history [--json]
//! siterefresh daemon start|stop|status|install|uninstall|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigArgs, daemon::DaemonCommand, history::HistoryArgs, run::RunArgs,
    trigger::TriggerArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "siterefresh",
    version,
    about = "Refresh a static site: sync listing data, then rebuild",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run sync and rebuild in this process.
    Run(RunArgs),

    /// Ask the running daemon to sync and rebuild.
    Trigger(TriggerArgs),

    /// Print the resolved configuration.
    Config(ConfigArgs),

    /// Show recent daemon runs.
    History(HistoryArgs),

    /// Manage the background daemon and launchd integration.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Trigger(args) => args.run(),
        Commands::Config(args) => args.run(),
        Commands::History(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
