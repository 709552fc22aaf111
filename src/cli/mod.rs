//! Command-line interface for ticketwatch
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::output::OutputOptions;

mod parse;
mod report;
mod run;
mod state;

/// ticketwatch - support ticket change notifications
///
/// Compares the latest ticket export with the previous run, announces new,
/// updated and closed tickets in chat, and remembers what it has seen.
#[derive(Parser, Debug)]
#[command(name = "ticketwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to ./ticketwatch.toml when present)
    #[arg(long, global = true, env = "TICKETWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect changes in the latest export and notify
    Run {
        /// Export file to read (overrides config)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Detect and report only: no notifications, state left untouched
        #[arg(long)]
        dry_run: bool,

        /// Append JSONL change events to a file, or `-` for stdout
        #[arg(long)]
        events: Option<String>,
    },

    /// Summarize an export: totals, active tickets, status breakdown
    Report {
        /// Export file to read (overrides config)
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Persisted state commands
    #[command(subcommand)]
    State(StateCommands),

    /// Parse an action log and print its most recent action
    Parse {
        /// File holding the action log (stdin when omitted)
        file: Option<PathBuf>,
    },
}

/// State subcommands
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Print the tickets currently tracked
    Show,
}

impl Cli {
    /// Whether `--events -` sends event lines to stdout.
    pub fn events_to_stdout(&self) -> bool {
        match &self.command {
            Commands::Run { events, .. } => events
                .as_deref()
                .map(|value| value.trim() == "-")
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Resolve the config file and apply environment overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::resolve(self.config.as_deref())?;
        config.apply_process_env();
        Ok(config)
    }

    /// Execute the CLI command
    pub fn run(self, config: Config) -> Result<()> {
        let output = OutputOptions {
            json: self.json && !self.events_to_stdout(),
            quiet: self.quiet,
        };

        match self.command {
            Commands::Run {
                snapshot,
                dry_run,
                events,
            } => run::run(
                &config,
                run::RunCommandOptions {
                    snapshot,
                    dry_run,
                    events,
                    output,
                },
            ),
            Commands::Report { snapshot } => report::run(&config, snapshot, output),
            Commands::State(cmd) => match cmd {
                StateCommands::Show => state::run_show(&config, output),
            },
            Commands::Parse { file } => parse::run(file, output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "ticketwatch",
            "--json",
            "run",
            "--snapshot",
            "export.csv",
            "--dry-run",
            "--events",
            "-",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(cli.events_to_stdout());
        match cli.command {
            Commands::Run {
                snapshot, dry_run, ..
            } => {
                assert_eq!(snapshot, Some(PathBuf::from("export.csv")));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_state_show() {
        let cli = Cli::try_parse_from(["ticketwatch", "state", "show", "-q"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::State(StateCommands::Show)));
        assert!(!cli.events_to_stdout());
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["ticketwatch", "ws", "list"]).is_err());
    }
}
