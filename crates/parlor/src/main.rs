// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parlor - reconciliation core for multi-tenant real-estate messaging.
//!
//! This is the binary entry point for the Parlor service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod config_cmd;
mod jobs;
mod queue;
mod serve;
mod shutdown;

use clap::{Parser, Subcommand};

/// Parlor - reconciliation core for multi-tenant real-estate messaging.
#[derive(Parser, Debug)]
#[command(name = "parlor", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync worker and the scheduled reconciliation jobs.
    Serve,
    /// Merge duplicate conversations, one pass, then exit.
    Merge,
    /// Rewrite conversation summaries that drifted from their messages.
    Repair,
    /// Permanently delete conversations past the trash retention window.
    Purge,
    /// Resolve pending channel pseudo-identifiers to phone numbers.
    ResolveAliases,
    /// Inspect and manage the outbound delivery queue.
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Check the host is fit to run scheduled jobs.
    Check {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Manage Parlor configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum QueueCommands {
    /// Show job counts by status.
    Status {
        /// Output machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// List failed jobs with their recorded errors.
    Failures {
        /// Output machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Requeue every failed job with a fresh attempt budget.
    Retry,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Check configuration files and environment overrides.
    Validate,
    /// Print the effective configuration as TOML.
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let config = match parlor_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            parlor_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Merge) => jobs::run_merge(&config).await,
        Some(Commands::Repair) => jobs::run_repair(&config).await,
        Some(Commands::Purge) => jobs::run_purge(&config).await,
        Some(Commands::ResolveAliases) => jobs::run_resolve_aliases(&config).await,
        Some(Commands::Queue { command }) => match command {
            QueueCommands::Status { json } => queue::run_status(&config, json).await,
            QueueCommands::Failures { json } => queue::run_failures(&config, json).await,
            QueueCommands::Retry => queue::run_retry(&config).await,
        },
        Some(Commands::Check { plain }) => match check::run_check(&config, plain).await {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(1),
            Err(e) => Err(e),
        },
        Some(Commands::Config { command }) => match command {
            ConfigCommands::Validate => config_cmd::run_validate(&config),
            ConfigCommands::Show => config_cmd::run_show(&config),
        },
        None => {
            println!("parlor: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        super::Cli::command().debug_assert();
    }

    #[test]
    fn binary_loads_config_defaults() {
        // Verify config loads with defaults (no config file needed)
        let config = parlor_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.queue.max_attempts, 3);
    }
}
