//! CLI entry point for the alphabook rebalancer.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};

use alphabook_rebalancer::config::Config;
use alphabook_rebalancer::cycle::Trigger;
use alphabook_rebalancer::error::Error;
use alphabook_rebalancer::execution::{self, RunOptions};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Portfolio rebalancer: features + AI proposal -> Alpaca")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one rebalance cycle now
    Run {
        /// How the run was started; scheduled runs honour the ET windows
        #[arg(long, value_enum, default_value = "manual")]
        trigger: Trigger,

        /// Plan orders without cancelling or submitting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Poll the clock and run at each configured window
    Serve {
        /// Seconds between scheduler ticks
        #[arg(long, default_value_t = 30)]
        poll_secs: u64,
    },

    /// Show current Alpaca positions
    Positions,

    /// Check Alpaca connection and market clock
    Status,

    /// Print the memory summary sent to the proposer
    Memory {
        /// Number of recent episodes
        #[arg(short, default_value_t = 5)]
        n: usize,
    },

    /// Print the recorded equity series
    Equity {
        #[arg(long, default_value_t = 300)]
        limit: usize,
    },
}

fn load(path: &PathBuf) -> Config {
    match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { trigger, dry_run } => {
            execution::run_once(&cli.config, &RunOptions { trigger, dry_run }).map(|outcome| {
                println!("{outcome}");
            })
        }
        Command::Serve { poll_secs } => {
            execution::serve(&cli.config, Duration::from_secs(poll_secs.max(1)))
        }
        Command::Positions => execution::show_positions(&load(&cli.config)),
        Command::Status => execution::check_status(&load(&cli.config)),
        Command::Memory { n } => execution::show_memory(&load(&cli.config), n),
        Command::Equity { limit } => execution::show_equity(&load(&cli.config), limit),
    };

    if let Err(e) = result {
        match &e {
            Error::RiskFailed(msg) => {
                eprintln!("\nAborted: {msg}");
                process::exit(2);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
