//! One rebalancing cycle, from gates to reconciliation.
//!
//! The cycle is linear:
//!
//! ```text
//! gates → account + positions_pre → bars → score → regime → memory
//!   → proposal → earnings blackout → risk weights → blend → episode
//!   → targets → prices → positions_post → turnover gate → fractionability
//!   → diff → pre-submit checks → cancel resting → submit → reconcile
//! ```
//!
//! Gates end the cycle with a skipped [`CycleOutcome`] before any broker
//! write. Account, position and bar reads are critical and propagate errors;
//! intraday prices, the earnings calendar, fractionability, episode and order
//! logging, and reconciliation degrade to a recorded warning.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use alphabook::{
    BarHistory, EventSink, Level, OrderIntent, Pick, ProposalOutcome, ProposalRequest,
    ProposedAllocation, Symbol, Weighting, Weights, check_turnover, compute_orders,
    detect_regime, final_weights, ingest_proposal, investable_capital, risk_weights,
    score_features, summarize, target_notionals, to_cents, top_panel,
};
use alphabook::memory::{Episode, NO_PRIOR_EPISODES};
use alphabook_broker::{Broker, OrderId};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::Config;
use crate::earnings::{self, EarningsCalendar};
use crate::error::{Error, Result};
use crate::proposal::AllocationProposer;
use crate::reconcile;
use crate::risk::{self, RiskLimits};
use crate::schedule::{to_eastern, window_tag};
use crate::store::{EpisodeStore, OrderRecord};

/// What started the cycle. Manual runs bypass the window gate only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
        }
    }
}

/// Terminal state of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeTag {
    SkippedDisabled,
    SkippedMarketClosed,
    SkippedOutsideWindow,
    SkippedMacroDay,
    SkippedNoBars,
    SkippedTurnover,
    NoCandidates,
    NoOrders,
    DryRun,
    OrdersSubmitted,
}

impl OutcomeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeTag::SkippedDisabled => "skipped-disabled",
            OutcomeTag::SkippedMarketClosed => "skipped-market-closed",
            OutcomeTag::SkippedOutsideWindow => "skipped-outside-window",
            OutcomeTag::SkippedMacroDay => "skipped-macro-day",
            OutcomeTag::SkippedNoBars => "skipped-no-bars",
            OutcomeTag::SkippedTurnover => "skipped-turnover",
            OutcomeTag::NoCandidates => "no-candidates",
            OutcomeTag::NoOrders => "no-orders",
            OutcomeTag::DryRun => "dry-run",
            OutcomeTag::OrdersSubmitted => "orders-submitted",
        }
    }

    pub fn is_skipped(self) -> bool {
        self.as_str().starts_with("skipped-")
    }
}

impl fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag, human-readable reason and structured detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub tag: OutcomeTag,
    pub reason: String,
    pub detail: Value,
}

impl CycleOutcome {
    fn new(tag: OutcomeTag, reason: impl Into<String>, detail: Value) -> Self {
        Self {
            tag,
            reason: reason.into(),
            detail,
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tag, self.reason)
    }
}

/// Collaborators for one cycle.
pub struct CycleContext<'a> {
    pub config: &'a Config,
    pub broker: &'a dyn Broker,
    pub proposer: &'a dyn AllocationProposer,
    pub store: &'a dyn EpisodeStore,
    pub earnings: Option<&'a dyn EarningsCalendar>,
    pub sink: &'a dyn EventSink,
}

fn finish(sink: &dyn EventSink, outcome: CycleOutcome) -> Result<CycleOutcome> {
    let level = if outcome.tag.is_skipped() {
        Level::Warn
    } else {
        Level::Info
    };
    sink.record(
        level,
        "cycle_outcome",
        json!({
            "tag": outcome.tag,
            "reason": outcome.reason,
            "detail": outcome.detail,
        }),
    );
    Ok(outcome)
}

fn memory_context(store: &dyn EpisodeStore, n: usize, sink: &dyn EventSink) -> String {
    match store.recent_episodes(n) {
        Ok(episodes) => summarize(&episodes),
        Err(e) => {
            sink.warn("memory_read_failed", json!({"error": e.to_string()}));
            NO_PRIOR_EPISODES.to_string()
        }
    }
}

fn request_proposal(
    ctx: &CycleContext<'_>,
    request: &ProposalRequest,
) -> ProposalOutcome {
    let constraints = ctx.config.constraints();
    match ctx.proposer.propose(request) {
        Ok(text) => ingest_proposal(&text, &constraints, request.asof, ctx.sink),
        Err(e) => {
            let reason = e.to_string();
            ctx.sink
                .warn("proposal_unavailable", json!({"error": reason}));
            ProposalOutcome::Fallback {
                allocation: ProposedAllocation::fallback(request.asof, &reason),
                reason,
            }
        }
    }
}

fn earnings_blackout(ctx: &CycleContext<'_>, allocation: &mut ProposedAllocation, today: chrono::NaiveDate) {
    let cfg = &ctx.config.earnings;
    if !cfg.enabled || allocation.picks.is_empty() {
        return;
    }
    let Some(calendar) = ctx.earnings else {
        ctx.sink
            .warn("earnings_gating_failed", json!({"error": "no calendar configured"}));
        return;
    };
    let symbols: Vec<Symbol> = allocation.picks.iter().map(|p| p.symbol).collect();
    match calendar.next_earnings(&symbols) {
        Ok(dates) => {
            earnings::apply_blackout(
                allocation,
                &dates,
                today,
                cfg.days_before,
                cfg.days_after,
                ctx.sink,
            );
        }
        Err(e) => ctx
            .sink
            .warn("earnings_gating_failed", json!({"error": e.to_string()})),
    }
}

/// Picks as persisted: blended weights, dropped names removed.
fn final_picks(allocation: &ProposedAllocation, blended: &Weights) -> Vec<Pick> {
    allocation
        .picks
        .iter()
        .filter(|p| blended.contains(&p.symbol))
        .map(|p| Pick {
            weight: blended.get(&p.symbol),
            ..p.clone()
        })
        .collect()
}

fn cents_map(pairs: &[(Symbol, i64)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(s, c)| (s.to_string(), json!(c)))
            .collect(),
    )
}

/// Wait, poll submitted orders, and compare holdings with the targets.
fn reconcile_after(
    ctx: &CycleContext<'_>,
    ids: &[OrderId],
    targets: &Weights,
    equity_cents: i64,
) -> Value {
    let delay = ctx.config.execution.reconcile_delay_secs;
    if delay > 0 {
        std::thread::sleep(Duration::from_secs(delay));
    }
    let statuses = reconcile::poll_orders(ctx.broker, ids, ctx.sink);

    let positions = match ctx.broker.positions() {
        Ok(p) => p,
        Err(e) => {
            ctx.sink
                .warn("reconcile_failed", json!({"error": e.to_string()}));
            return json!({"fills": statuses});
        }
    };
    let report = reconcile::reconcile(&positions, targets, equity_cents);
    ctx.sink.info(
        "reconciled",
        json!({"tracking_error_pct": report.tracking_error_pct, "entries": report.entries}),
    );
    json!({"fills": statuses, "tracking_error_pct": report.tracking_error_pct})
}

/// Run one cycle.
///
/// Returns the terminal outcome. Errors are reserved for critical failures:
/// broker reads of account, positions or bars, malformed bar data, and a
/// failed pre-submit check.
pub fn run_cycle(ctx: &CycleContext<'_>, trigger: Trigger) -> Result<CycleOutcome> {
    let config = ctx.config;
    let sink = ctx.sink;
    let strategy = &config.strategy;
    let schedule = config.schedule()?;

    sink.info(
        "cycle_started",
        json!({"trigger": trigger.as_str(), "dry_run": config.execution.dry_run}),
    );

    // Gates.
    if !schedule.enabled {
        return finish(
            sink,
            CycleOutcome::new(OutcomeTag::SkippedDisabled, "trader disabled", json!({})),
        );
    }

    let clock = ctx.broker.clock()?;
    if !clock.is_tradable(schedule.avoid_near_close_min) {
        return finish(
            sink,
            CycleOutcome::new(
                OutcomeTag::SkippedMarketClosed,
                "market closed or too near the close",
                json!({
                    "now": clock.timestamp,
                    "is_open": clock.is_open,
                    "minutes_to_close": clock.minutes_to_close(),
                    "buffer_min": schedule.avoid_near_close_min,
                }),
            ),
        );
    }

    let now = clock.timestamp;
    let today = to_eastern(now).date_naive();
    if schedule.is_macro_day(now) {
        return finish(
            sink,
            CycleOutcome::new(
                OutcomeTag::SkippedMacroDay,
                "macro event day",
                json!({"date": today.to_string()}),
            ),
        );
    }

    if trigger == Trigger::Scheduled && schedule.matching_window(now).is_none() {
        return finish(
            sink,
            CycleOutcome::new(
                OutcomeTag::SkippedOutsideWindow,
                "outside configured windows",
                json!({
                    "now_et": to_eastern(now).format("%Y-%m-%d %H:%M").to_string(),
                    "windows_et": config.schedule.windows_et,
                    "tolerance_min": schedule.tolerance_min,
                }),
            ),
        );
    }

    // Inputs.
    let account = ctx.broker.account()?;
    let positions_pre = ctx.broker.positions()?;
    sink.info(
        "account",
        json!({
            "equity_cents": account.equity_cents,
            "cash_cents": account.cash_cents,
            "positions": positions_pre.len(),
        }),
    );

    let symbols = config.scoring_symbols();
    let bars = ctx.broker.daily_bars(&symbols, strategy.lookback_days)?;
    if bars.is_empty() {
        return finish(
            sink,
            CycleOutcome::new(
                OutcomeTag::SkippedNoBars,
                "no bars returned",
                json!({"symbols": symbols.len()}),
            ),
        );
    }
    let history = BarHistory::from_bars(bars)?;

    // Decision.
    let rows = score_features(&history);
    if rows.is_empty() {
        return finish(
            sink,
            CycleOutcome::new(
                OutcomeTag::SkippedNoBars,
                "no symbol has enough history to score",
                json!({"symbols_with_bars": history.len()}),
            ),
        );
    }
    sink.info(
        "features_scored",
        json!({
            "symbols_with_bars": history.len(),
            "scored": rows.len(),
            "best": rows[0].symbol,
        }),
    );

    let regime = detect_regime(&rows, &config.regime_config());
    sink.info("regime", json!(regime));

    let panel = top_panel(&rows, strategy.panel_size);
    let memory = memory_context(ctx.store, config.proposal.memory_episodes, sink);
    let constraints = config.constraints();
    let request = ProposalRequest::new(now, panel.clone(), constraints, memory);

    let proposal = request_proposal(ctx, &request);
    let fallback_reason = match &proposal {
        ProposalOutcome::Fallback { reason, .. } => Some(reason.clone()),
        ProposalOutcome::Accepted(_) => None,
    };
    let mut allocation = proposal.into_allocation();
    earnings_blackout(ctx, &mut allocation, today);

    let proposal_weights = allocation.weights();
    let risk = match strategy.weighting {
        Weighting::VolTarget => risk_weights(&allocation.picks, &rows, strategy.max_weight),
        Weighting::None => Weights::new(),
    };
    let blended = final_weights(
        &proposal_weights,
        &risk,
        strategy.weighting,
        strategy.ai_weight,
        strategy.max_weight,
    );
    sink.info(
        "weights_blended",
        json!({"proposal": proposal_weights, "risk": risk, "blended": blended}),
    );

    let episode = Episode {
        asof: now,
        window_tag: window_tag(now).to_string(),
        equity_cents: account.equity_cents,
        cash_cents: account.cash_cents,
        constraints,
        top_panel: panel,
        picks: final_picks(&allocation, &blended),
        notes: allocation.notes.clone(),
        confidence: allocation.confidence,
    };
    if let Err(e) = ctx.store.append_episode(&episode) {
        sink.warn("episode_log_failed", json!({"error": e.to_string()}));
    }

    if blended.is_empty() {
        let reason = fallback_reason
            .map(|r| format!("proposal rejected: {r}"))
            .unwrap_or_else(|| "no picks survived blending".into());
        return finish(
            sink,
            CycleOutcome::new(
                OutcomeTag::NoCandidates,
                reason,
                json!({"notes": allocation.notes, "confidence": allocation.confidence}),
            ),
        );
    }

    // Targets and prices.
    let investable =
        investable_capital(account.equity_cents, strategy.cash_buffer, regime.scalar);
    let targets = target_notionals(&blended, investable);
    sink.info(
        "targets",
        json!({
            "investable_cents": investable,
            "regime_scalar": regime.scalar,
            "targets_cents": cents_map(&targets),
        }),
    );

    let mut prices: FxHashMap<Symbol, i64> =
        rows.iter().map(|r| (r.symbol, to_cents(r.last))).collect();
    if strategy.use_intraday {
        let wanted: BTreeSet<Symbol> = targets
            .iter()
            .map(|(s, _)| *s)
            .chain(positions_pre.iter().map(|p| p.symbol))
            .collect();
        let wanted: Vec<Symbol> = wanted.into_iter().collect();
        match ctx.broker.latest_prices(&wanted) {
            Ok(live) => {
                sink.record(Level::Debug, "intraday_prices", json!({"count": live.len()}));
                prices.extend(live);
            }
            Err(e) => sink.warn("intraday_price_fetch_failed", json!({"error": e.to_string()})),
        }
    }

    // Diff against fresh holdings.
    let positions_post = ctx.broker.positions()?;
    let diff_config = config.diff_config();
    let turnover = check_turnover(
        &targets,
        &positions_post,
        account.cash_cents,
        diff_config.turnover_base,
        diff_config.turnover_limit,
    );
    if !turnover.passed {
        sink.warn("turnover_exceeded", json!(turnover));
        return finish(
            sink,
            CycleOutcome::new(
                OutcomeTag::SkippedTurnover,
                format!(
                    "turnover {:.1}% exceeds {:.1}% limit",
                    turnover.ratio() * 100.0,
                    turnover.limit * 100.0
                ),
                json!(turnover),
            ),
        );
    }

    let trade_symbols: Vec<Symbol> = targets
        .iter()
        .map(|(s, _)| *s)
        .chain(positions_post.iter().map(|p| p.symbol))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let fractionable = match ctx.broker.fractionable(&trade_symbols) {
        Ok(set) => set,
        Err(e) => {
            sink.warn(
                "fractionable_lookup_failed",
                json!({"error": e.to_string(), "fallback": "whole shares"}),
            );
            FxHashSet::default()
        }
    };

    let orders = compute_orders(
        &targets,
        &positions_post,
        &prices,
        &fractionable,
        diff_config.dust_cents,
        sink,
    );
    if orders.is_empty() {
        return finish(
            sink,
            CycleOutcome::new(
                OutcomeTag::NoOrders,
                "no orders necessary",
                json!({"turnover": turnover}),
            ),
        );
    }

    let report = risk::check_pre_submit(
        &blended,
        &orders,
        &prices,
        &RiskLimits {
            max_weight: strategy.max_weight,
            max_orders: config.execution.max_orders_per_run,
            buying_power_cents: account.buying_power_cents,
        },
    );
    let level = if report.has_failures() {
        Level::Error
    } else if report.has_warnings() {
        Level::Warn
    } else {
        Level::Info
    };
    sink.record(level, "risk_check", json!(report));
    if report.has_failures() {
        return Err(Error::RiskFailed(report.failures()));
    }

    let planned: Vec<String> = orders.iter().map(OrderIntent::to_string).collect();
    if config.execution.dry_run {
        sink.info("dry_run_orders", json!({"orders": orders}));
        return finish(
            sink,
            CycleOutcome::new(
                OutcomeTag::DryRun,
                format!("{} orders planned, none submitted", orders.len()),
                json!({"orders": planned}),
            ),
        );
    }

    // Execution.
    let cancelled = ctx.broker.cancel_all_open_orders()?;
    sink.info("open_orders_cancelled", json!({"count": cancelled}));

    let mut ids = Vec::with_capacity(orders.len());
    let mut failed = Vec::new();
    for order in &orders {
        match ctx.broker.submit_order(order) {
            Ok(ack) => {
                sink.info(
                    "order_submitted",
                    json!({
                        "order": order,
                        "order_id": ack.id,
                        "status": ack.status.as_str(),
                    }),
                );
                if let Err(e) = ctx.store.append_order(&OrderRecord::new(now, order, &ack)) {
                    sink.warn("order_log_failed", json!({"error": e.to_string()}));
                }
                ids.push(ack.id);
            }
            Err(e) => {
                sink.record(
                    Level::Error,
                    "order_failed",
                    json!({"order": order, "error": e.to_string()}),
                );
                failed.push(order.to_string());
            }
        }
    }

    let reconciliation = reconcile_after(ctx, &ids, &blended, account.equity_cents);

    finish(
        sink,
        CycleOutcome::new(
            OutcomeTag::OrdersSubmitted,
            format!("{} submitted, {} failed", ids.len(), failed.len()),
            json!({
                "orders": planned,
                "order_ids": ids,
                "failed": failed,
                "reconciliation": reconciliation,
            }),
        ),
    )
}
