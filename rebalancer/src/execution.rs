//! CLI commands: single runs, the scheduler loop, and read-only reports.

use std::path::Path;
use std::time::Duration;

use alphabook::{EventSink, Level, PositionSnapshot, summarize, to_dollars};
use alphabook_broker::Broker;
use chrono::Utc;
use log::{error, info};
use serde_json::json;

use crate::audit::AuditSink;
use crate::broker;
use crate::config::Config;
use crate::cycle::{CycleContext, CycleOutcome, Trigger, run_cycle};
use crate::earnings::{EarningsCalendar, FileCalendar};
use crate::error::Result;
use crate::proposal;
use crate::schedule::RunGuard;
use crate::store::{EpisodeStore, JsonlStore};

/// Options for a single run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub trigger: Trigger,
    /// Forces dry-run on top of the config value.
    pub dry_run: bool,
}

/// The configured episode/order store.
pub fn store_for(config: &Config) -> JsonlStore {
    JsonlStore::new(config.episodes_path(), config.orders_path())
}

/// Load the config snapshot for one run, applying CLI overrides.
pub fn load_for_run(config_path: &Path, opts: &RunOptions) -> Result<Config> {
    let mut config = Config::load(config_path)?;
    if opts.dry_run {
        config.execution.dry_run = true;
    }
    Ok(config)
}

/// Run one cycle against an already connected broker.
///
/// A cycle error is recorded as `cycle_failed` before it is returned.
pub fn run_with(
    config: &Config,
    broker: &dyn Broker,
    trigger: Trigger,
    sink: &dyn EventSink,
) -> Result<CycleOutcome> {
    let proposer = proposal::from_config(&config.proposal)?;
    let store = store_for(config);
    let calendar = config.earnings.calendar_file.as_ref().map(|p| FileCalendar::new(p.clone()));

    let ctx = CycleContext {
        config,
        broker,
        proposer: proposer.as_ref(),
        store: &store,
        earnings: calendar.as_ref().map(|c| c as &dyn EarningsCalendar),
        sink,
    };
    run_cycle(&ctx, trigger).inspect_err(|e| {
        sink.record(
            Level::Error,
            "cycle_failed",
            json!({"trigger": trigger.as_str(), "error": e.to_string()}),
        );
    })
}

/// Connect and run one cycle with a freshly loaded config.
pub fn run_once(config_path: &Path, opts: &RunOptions) -> Result<CycleOutcome> {
    let config = load_for_run(config_path, opts)?;
    let sink = AuditSink::open_or_log_only(&config.runlog_path());
    run_loaded(&config, opts.trigger, &sink)
}

fn run_loaded(config: &Config, trigger: Trigger, sink: &AuditSink) -> Result<CycleOutcome> {
    let mut broker = match broker::connect(&config.broker) {
        Ok(b) => b,
        Err(e) => {
            sink.record(
                Level::Error,
                "cycle_failed",
                json!({"trigger": trigger.as_str(), "error": e.to_string()}),
            );
            return Err(e);
        }
    };
    let result = run_with(config, broker.as_ref(), trigger, sink);
    if let Err(e) = broker.disconnect() {
        log::warn!("Disconnect failed: {e}");
    }
    result
}

/// Scheduler loop: re-read the config every tick and run once per window.
///
/// Errors (config, broker, cycle) are logged and the loop keeps polling.
pub fn serve(config_path: &Path, poll: Duration) -> Result<()> {
    info!("Scheduler starting, config {}", config_path.display());
    let mut guard = RunGuard::new();

    loop {
        let config = match Config::load(config_path) {
            Ok(c) => c,
            Err(e) => {
                error!("Config reload failed, will retry: {e}");
                std::thread::sleep(poll);
                continue;
            }
        };
        let schedule = match config.schedule() {
            Ok(s) => s,
            Err(e) => {
                error!("Schedule invalid, will retry: {e}");
                std::thread::sleep(poll);
                continue;
            }
        };

        let now = Utc::now();
        if let Some(marker) = guard.due(now, &schedule) {
            info!("Triggering scheduled run for {} {}", marker.date, marker.minute);
            let sink = AuditSink::open_or_log_only(&config.runlog_path());
            match run_loaded(&config, Trigger::Scheduled, &sink) {
                Ok(outcome) => info!("Scheduled run finished: {outcome}"),
                Err(e) => {
                    error!("Scheduled run failed: {e}");
                    sink.record(
                        Level::Error,
                        "scheduled_run_failed",
                        json!({"marker": marker, "error": e.to_string()}),
                    );
                }
            }
            guard.mark(marker);
        }

        std::thread::sleep(poll);
    }
}

/// Show current positions with weights of equity.
pub fn show_positions(config: &Config) -> Result<()> {
    let mut broker = broker::connect(&config.broker)?;
    let account = broker.account()?;
    let positions = broker.positions()?;
    broker.disconnect()?;

    println!(
        "Equity ${:.2}, cash ${:.2}, buying power ${:.2}\n",
        to_dollars(account.equity_cents),
        to_dollars(account.cash_cents),
        to_dollars(account.buying_power_cents),
    );
    display_positions(&positions, account.equity_cents);
    Ok(())
}

/// Check broker connectivity and the market clock.
pub fn check_status(config: &Config) -> Result<()> {
    print!(
        "Connecting to Alpaca ({})... ",
        if config.broker.paper { "paper" } else { "live" }
    );
    let mut broker = broker::connect(&config.broker)?;
    println!("OK");

    let account = broker.account()?;
    let clock = broker.clock()?;
    broker.disconnect()?;

    println!("Equity ${:.2}", to_dollars(account.equity_cents));
    println!(
        "Market {} (now {}, next close {}, next open {})",
        if clock.is_open { "OPEN" } else { "CLOSED" },
        clock.timestamp,
        clock
            .next_close
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".into()),
        clock
            .next_open
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".into()),
    );
    Ok(())
}

/// Print the memory context the next proposal would receive.
pub fn show_memory(config: &Config, n: usize) -> Result<()> {
    let episodes = store_for(config).recent_episodes(n)?;
    println!("{}", summarize(&episodes));
    Ok(())
}

/// Print the equity/cash series recorded with episodes.
pub fn show_equity(config: &Config, limit: usize) -> Result<()> {
    let series = store_for(config).equity_series(limit)?;
    if series.is_empty() {
        println!("No episodes recorded.");
        return Ok(());
    }
    println!("{:20} {:>14} {:>14}", "asof", "equity", "cash");
    for s in &series {
        println!(
            "{:20} {:>14.2} {:>14.2}",
            s.asof.format("%Y-%m-%d %H:%M"),
            to_dollars(s.equity_cents),
            to_dollars(s.cash_cents),
        );
    }
    Ok(())
}

fn display_positions(positions: &[PositionSnapshot], equity_cents: i64) {
    if positions.is_empty() {
        println!("No positions.");
        return;
    }

    println!("CURRENT PORTFOLIO:");
    for pos in positions {
        let weight = if equity_cents > 0 {
            pos.market_value_cents as f64 / equity_cents as f64
        } else {
            0.0
        };
        println!(
            "  {:8} {:>10.4} @ ${:>8.2} avg = ${:>10.2}  ({:.1}%)  P&L ${:>+9.2}",
            pos.symbol.as_str(),
            pos.quantity,
            to_dollars(pos.avg_entry_price_cents),
            to_dollars(pos.market_value_cents),
            weight * 100.0,
            to_dollars(pos.unrealized_pl_cents),
        );
    }
}
