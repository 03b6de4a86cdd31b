// Copyright 2026 Ticket Sniper Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use ticket_sniper::cli;
use ticket_sniper::config::DEFAULT_PLATFORM;

#[derive(Parser)]
#[command(
    name = "ticket-sniper",
    about = "Ticket Sniper: sale-window synchronized ticket acquisition",
    version,
    after_help = "Run 'ticket-sniper <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Also append logs to this file
    #[arg(long, global = true, default_value = "ticket_sniper.log")]
    log_file: PathBuf,

    /// Do not write a log file
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, wait for the sale and try to buy
    Run {
        /// Path to the JSON config file
        #[arg(long, short)]
        config: Option<String>,
        /// Platform section of the config to use
        #[arg(long, default_value = DEFAULT_PLATFORM)]
        platform: String,
    },
    /// Validate the config and print the resolved plan
    Check {
        /// Path to the JSON config file
        #[arg(long, short)]
        config: Option<String>,
        /// Platform section of the config to use
        #[arg(long, default_value = DEFAULT_PLATFORM)]
        platform: String,
    },
    /// Check environment and diagnose issues
    Doctor {
        /// Path to the JSON config file
        #[arg(long, short)]
        config: Option<String>,
        /// Platform section of the config to use
        #[arg(long, default_value = DEFAULT_PLATFORM)]
        platform: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, platform } => {
            let log_file = (!cli.no_log_file).then_some(cli.log_file.as_path());
            cli::logging::init(cli.verbose, cli.json, log_file)?;
            cli::run_cmd::run(config.as_deref(), &platform, cli.json).await
        }
        Commands::Check { config, platform } => {
            cli::check_cmd::run(config.as_deref(), &platform, cli.json).map(|_| 0)
        }
        Commands::Doctor { config, platform } => {
            cli::doctor::run(config.as_deref(), &platform).await.map(|_| 0)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "ticket-sniper", &mut std::io::stdout());
            Ok(0)
        }
    };

    // Exit codes: 0=acquired/ok, 1=error or fatal abort, 2=retries exhausted
    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "error": true, "message": format!("{e:#}") })
                );
            } else {
                eprintln!("  Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}
