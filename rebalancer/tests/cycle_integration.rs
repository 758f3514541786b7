// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! End-to-end cycle tests against the mock broker.

use std::cell::RefCell;
use std::path::PathBuf;

use alphabook::memory::NO_PRIOR_EPISODES;
use alphabook::{OrderSize, ProposalRequest, RecordingSink, Side, Symbol};
use alphabook_broker::mock::{MockBroker, MockBrokerBuilder, MockCall};
use alphabook_broker::{Broker, Clock};
use alphabook_rebalancer::config::Config;
use alphabook_rebalancer::cycle::{CycleContext, CycleOutcome, OutcomeTag, Trigger, run_cycle};
use alphabook_rebalancer::earnings::EarningsCalendar;
use alphabook_rebalancer::error::{Error, Result};
use alphabook_rebalancer::proposal::{AllocationProposer, FileProposer};
use alphabook_rebalancer::store::{EpisodeStore, JsonlStore};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rustc_hash::FxHashMap;
use tempfile::TempDir;

fn sym(s: &str) -> Symbol {
    Symbol::new(s)
}

/// 130 daily closes: drift plus a small wobble so volatility is non-zero.
fn closes(drift: f64, phase: f64) -> Vec<f64> {
    (0..130)
        .map(|i| {
            let t = i as f64;
            100.0 * (1.0 + drift).powf(t) * (1.0 + 0.01 * (0.7 * t + phase).sin())
        })
        .collect()
}

fn market() -> MockBrokerBuilder {
    with_market(MockBroker::builder())
}

/// Add the test universe. Call after `with_clock` so bars end before it.
fn with_market(builder: MockBrokerBuilder) -> MockBrokerBuilder {
    builder
        .with_closes(sym("AAA"), &closes(0.002, 0.0))
        .with_closes(sym("BBB"), &closes(0.0015, 1.0))
        .with_closes(sym("CCC"), &closes(0.001, 2.0))
        .with_closes(sym("SPY"), &closes(0.0008, 3.0))
}

fn connected(builder: MockBrokerBuilder) -> MockBroker {
    let mut broker = builder.build();
    broker.connect().unwrap();
    broker
}

fn proposal_json(picks: &[(&str, f64)]) -> String {
    let picks: Vec<serde_json::Value> = picks
        .iter()
        .map(|(s, w)| serde_json::json!({"symbol": s, "weight": w, "rationale": "momentum"}))
        .collect();
    serde_json::json!({
        "asof": "2026-03-04T16:55:00Z",
        "picks": picks,
        "notes": "test allocation",
        "confidence": 0.7,
    })
    .to_string()
}

struct Harness {
    dir: TempDir,
    config: Config,
    sink: RecordingSink,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let proposal = dir.path().join("proposal.json");
        let logs = dir.path().join("logs");
        let toml = format!(
            r#"
[broker]

[strategy]
universe = ["AAA", "BBB", "CCC"]
max_positions = 3
max_weight = 0.40
cash_buffer = 0.0
weighting = "none"
regime_filter = false

[risk]
turnover_limit = 0.25
min_order_usd = 5.0

[schedule]
windows_et = ["12:00"]

[proposal]
source = "file"
path = {proposal:?}

[execution]
reconcile_delay_secs = 0

[logging]
dir = {logs:?}
"#,
            proposal = proposal.display().to_string(),
            logs = logs.display().to_string(),
        );
        let config = Config::from_toml(&toml).unwrap();
        let harness = Self {
            dir,
            config,
            sink: RecordingSink::new(),
        };
        harness.write_proposal(&proposal_json(&[("AAA", 0.4), ("BBB", 0.3)]));
        harness
    }

    fn proposal_path(&self) -> PathBuf {
        self.dir.path().join("proposal.json")
    }

    fn write_proposal(&self, text: &str) {
        std::fs::write(self.proposal_path(), text).unwrap();
    }

    fn store(&self) -> JsonlStore {
        JsonlStore::new(self.config.episodes_path(), self.config.orders_path())
    }

    fn run_with(
        &self,
        broker: &MockBroker,
        proposer: &dyn AllocationProposer,
        earnings: Option<&dyn EarningsCalendar>,
        trigger: Trigger,
    ) -> Result<CycleOutcome> {
        let store = self.store();
        let ctx = CycleContext {
            config: &self.config,
            broker,
            proposer,
            store: &store,
            earnings,
            sink: &self.sink,
        };
        run_cycle(&ctx, trigger)
    }

    fn run(&self, broker: &MockBroker, trigger: Trigger) -> Result<CycleOutcome> {
        let proposer = FileProposer::new(self.proposal_path());
        self.run_with(broker, &proposer, None, trigger)
    }
}

/// Returns canned text and remembers every request it saw.
struct ScriptedProposer {
    text: String,
    seen: RefCell<Vec<ProposalRequest>>,
}

impl AllocationProposer for ScriptedProposer {
    fn propose(&self, request: &ProposalRequest) -> Result<String> {
        self.seen.borrow_mut().push(request.clone());
        Ok(self.text.clone())
    }
}

struct FixedCalendar(FxHashMap<Symbol, NaiveDate>);

impl EarningsCalendar for FixedCalendar {
    fn next_earnings(&self, _symbols: &[Symbol]) -> Result<FxHashMap<Symbol, NaiveDate>> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// Gates
// ============================================================================

#[test]
fn disabled_skips_before_any_broker_call() {
    let mut h = Harness::new();
    h.config.schedule.enabled = false;
    // Not connected: any broker call would error.
    let broker = market().build();

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::SkippedDisabled);
    assert!(h.sink.contains("cycle_outcome"));
}

#[test]
fn closed_market_skips() {
    let h = Harness::new();
    let broker = connected(market().market_closed());

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::SkippedMarketClosed);
    assert!(broker.submitted_orders().is_empty());
    assert_eq!(broker.cancel_calls(), 0);
}

#[test]
fn near_close_counts_as_closed() {
    let h = Harness::new();
    let now = Utc.with_ymd_and_hms(2026, 3, 4, 20, 50, 0).unwrap();
    let clock = Clock {
        timestamp: now,
        is_open: true,
        next_open: None,
        next_close: Some(now + Duration::minutes(10)),
    };
    let broker = connected(with_market(MockBroker::builder().with_clock(clock)));

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::SkippedMarketClosed);
    assert_eq!(outcome.detail["minutes_to_close"], 10);
}

#[test]
fn macro_day_skips_even_when_manual() {
    let mut h = Harness::new();
    h.config.schedule.macro_dates = vec!["2026-03-04".into()];
    let broker = connected(market());

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::SkippedMacroDay);
    assert_eq!(outcome.detail["date"], "2026-03-04");
}

#[test]
fn window_gate_applies_to_scheduled_runs_only() {
    let mut h = Harness::new();
    h.config.schedule.windows_et = vec!["10:00".into()];
    h.config.execution.dry_run = true;
    let broker = connected(market().all_fractionable());

    let scheduled = h.run(&broker, Trigger::Scheduled).unwrap();
    assert_eq!(scheduled.tag, OutcomeTag::SkippedOutsideWindow);

    let manual = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(manual.tag, OutcomeTag::DryRun);
}

#[test]
fn scheduled_run_inside_tolerance_proceeds() {
    let mut h = Harness::new();
    h.config.schedule.windows_et = vec!["11:58".into()];
    h.config.execution.dry_run = true;
    let broker = connected(market().all_fractionable());

    let outcome = h.run(&broker, Trigger::Scheduled).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::DryRun);
}

// ============================================================================
// Data and proposal
// ============================================================================

#[test]
fn no_bars_skips() {
    let h = Harness::new();
    let broker = connected(MockBroker::builder());

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::SkippedNoBars);
}

#[test]
fn short_history_skips_as_no_bars() {
    let h = Harness::new();
    let short: Vec<f64> = closes(0.002, 0.0).into_iter().take(30).collect();
    let broker = connected(MockBroker::builder().with_closes(sym("AAA"), &short));

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::SkippedNoBars);
}

#[test]
fn malformed_proposal_ends_without_liquidating() {
    let h = Harness::new();
    h.write_proposal("the model said no");
    let broker = connected(
        market()
            .all_fractionable()
            .with_position(sym("CCC"), 1_000.0, 100_00),
    );

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::NoCandidates);
    assert!(outcome.reason.starts_with("proposal rejected"));
    assert!(h.sink.contains("proposal_fallback"));
    assert!(broker.submitted_orders().is_empty());

    // The fallback episode is still persisted.
    let episodes = h.store().recent_episodes(5).unwrap();
    assert_eq!(episodes.len(), 1);
    assert!(episodes[0].picks.is_empty());
    assert!(episodes[0].notes.starts_with("ValidationError: "));
}

#[test]
fn missing_proposal_file_is_no_candidates() {
    let h = Harness::new();
    std::fs::remove_file(h.proposal_path()).unwrap();
    let broker = connected(market());

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::NoCandidates);
    assert!(h.sink.contains("proposal_unavailable"));
}

#[test]
fn memory_context_feeds_next_proposal() {
    let mut h = Harness::new();
    h.config.execution.dry_run = true;
    let broker = connected(market().all_fractionable());
    let proposer = ScriptedProposer {
        text: proposal_json(&[("AAA", 0.4), ("BBB", 0.3)]),
        seen: RefCell::new(Vec::new()),
    };

    h.run_with(&broker, &proposer, None, Trigger::Manual).unwrap();
    h.run_with(&broker, &proposer, None, Trigger::Manual).unwrap();

    let seen = proposer.seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].memory_context, NO_PRIOR_EPISODES);
    assert!(seen[1].memory_context.contains("2026-03-04 17:00 (pm)"));
    assert!(seen[1].memory_context.contains("AAA:40%"));
    assert_eq!(seen[0].max_positions, 3);
    assert!(!seen[0].panel.is_empty());
}

#[test]
fn earnings_blackout_removes_pick() {
    let mut h = Harness::new();
    h.config.earnings.enabled = true;
    h.config.earnings.days_before = 3;
    h.config.earnings.days_after = 1;
    let broker = connected(market().all_fractionable());
    let proposer = FileProposer::new(h.proposal_path());
    let mut dates = FxHashMap::default();
    dates.insert(sym("AAA"), NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
    let calendar = FixedCalendar(dates);

    let outcome = h
        .run_with(&broker, &proposer, Some(&calendar), Trigger::Manual)
        .unwrap();
    assert_eq!(outcome.tag, OutcomeTag::OrdersSubmitted);
    assert!(h.sink.contains("blocked_by_earnings"));
    let orders = broker.submitted_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].symbol, sym("BBB"));
}

// ============================================================================
// Diff and execution
// ============================================================================

#[test]
fn turnover_gate_blocks_large_rebalance() {
    let h = Harness::new();
    let broker = connected(
        market()
            .all_fractionable()
            .with_position(sym("CCC"), 100_000.0, 100),
    );

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::SkippedTurnover);
    assert!(h.sink.contains("turnover_exceeded"));
    assert!(broker.submitted_orders().is_empty());
    assert_eq!(broker.cancel_calls(), 0);
}

#[test]
fn holdings_on_target_need_no_orders() {
    let h = Harness::new();
    let broker = connected(
        market()
            .all_fractionable()
            .with_position(sym("AAA"), 400_000.0, 100)
            .with_position(sym("BBB"), 300_000.0, 100),
    );

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::NoOrders);
    assert_eq!(broker.cancel_calls(), 0);
}

#[test]
fn dry_run_plans_without_touching_broker() {
    let mut h = Harness::new();
    h.config.execution.dry_run = true;
    let broker = connected(market().all_fractionable().with_open_orders(2));

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::DryRun);
    assert_eq!(outcome.detail["orders"].as_array().unwrap().len(), 2);
    assert!(h.sink.contains("dry_run_orders"));
    assert!(broker.submitted_orders().is_empty());
    assert_eq!(broker.cancel_calls(), 0);
}

#[test]
fn fresh_account_submits_and_logs() {
    let h = Harness::new();
    let broker = connected(market().all_fractionable().with_open_orders(2));

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::OrdersSubmitted, "{outcome}");
    assert_eq!(broker.cancel_calls(), 1);

    let orders = broker.submitted_orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].symbol, sym("AAA"));
    assert_eq!(orders[1].symbol, sym("BBB"));
    assert!(orders.iter().all(|o| o.side == Side::Buy));
    match orders[0].size {
        OrderSize::Notional(cents) => assert!((cents - 400_000_00).abs() <= 1),
        other => panic!("expected notional, got {other:?}"),
    }

    let logged = h.store().recent_orders(10).unwrap();
    assert_eq!(logged.len(), 2);
    assert!(logged.iter().all(|r| r.order_id.0.starts_with("mock-")));

    let episodes = h.store().recent_episodes(5).unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].window_tag, "pm");
    assert_eq!(episodes[0].picks.len(), 2);
    assert!((episodes[0].picks[0].weight - 0.4).abs() < 1e-12);

    assert_eq!(outcome.detail["order_ids"].as_array().unwrap().len(), 2);
    assert!(h.sink.contains("open_orders_cancelled"));
    assert!(h.sink.contains("order_status"));
    assert!(h.sink.contains("reconciled"));
}

#[test]
fn existing_position_outside_targets_is_sold_first() {
    let mut h = Harness::new();
    h.config.risk.turnover_limit = 100.0;
    let broker = connected(
        market()
            .all_fractionable()
            .with_position(sym("CCC"), 1_000.0, 100_00),
    );

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::OrdersSubmitted);
    let orders = broker.submitted_orders();
    assert_eq!(orders.len(), 3);
    assert_eq!(orders[0].symbol, sym("CCC"));
    assert_eq!(orders[0].side, Side::Sell);
    assert_eq!(orders[0].size, OrderSize::Notional(100_000_00));
}

#[test]
fn fractionable_lookup_failure_falls_back_to_whole_shares() {
    let h = Harness::new();
    let broker = connected(market().failing(MockCall::Fractionable));

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::OrdersSubmitted);
    assert!(h.sink.contains("fractionable_lookup_failed"));
    assert!(
        broker
            .submitted_orders()
            .iter()
            .all(|o| matches!(o.size, OrderSize::Shares(q) if q > 0))
    );
}

#[test]
fn intraday_price_failure_degrades() {
    let h = Harness::new();
    let broker = connected(market().failing(MockCall::LatestPrices));

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::OrdersSubmitted);
    assert!(h.sink.contains("intraday_price_fetch_failed"));
}

#[test]
fn rejected_order_is_reported_and_others_proceed() {
    let h = Harness::new();
    let broker = connected(market().all_fractionable().reject_symbol(sym("BBB")));

    let outcome = h.run(&broker, Trigger::Manual).unwrap();
    assert_eq!(outcome.tag, OutcomeTag::OrdersSubmitted);
    assert_eq!(outcome.detail["failed"].as_array().unwrap().len(), 1);
    assert!(h.sink.contains("order_failed"));
    assert_eq!(h.store().recent_orders(10).unwrap().len(), 1);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn order_limit_fails_pre_submit() {
    let mut h = Harness::new();
    h.config.execution.max_orders_per_run = 1;
    let broker = connected(market().all_fractionable());

    let err = h.run(&broker, Trigger::Manual).unwrap_err();
    assert!(matches!(err, Error::RiskFailed(ref m) if m.contains("Order count")));
    assert!(broker.submitted_orders().is_empty());
    assert_eq!(broker.cancel_calls(), 0);
}

#[test]
fn account_failure_is_critical() {
    let h = Harness::new();
    let broker = connected(market().failing(MockCall::Account));

    let err = h.run(&broker, Trigger::Manual).unwrap_err();
    assert!(matches!(err, Error::Broker(_)));
}

#[test]
fn cancel_failure_blocks_submission() {
    let h = Harness::new();
    let broker = connected(market().all_fractionable().failing(MockCall::CancelAll));

    let err = h.run(&broker, Trigger::Manual).unwrap_err();
    assert!(matches!(err, Error::Broker(_)));
    assert!(broker.submitted_orders().is_empty());
}
