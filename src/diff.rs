//! Order diff engine: dollar targets vs. current holdings to order intents.
//!
//! Two stages:
//!
//! 1. [`check_turnover`]: an all-or-nothing gate on the total dollar change.
//! 2. [`compute_orders`]: per-symbol deltas, dust filtering, and sizing as a
//!    notional (fractionable names) or whole shares.
//!
//! [`plan_rebalance`] runs both and is what the cycle calls.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::event::{EventSink, Level};
use crate::order::{OrderIntent, PositionSnapshot};
use crate::{Side, Symbol};

/// Denominator used by the turnover gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnoverBase {
    /// Sum of current position market values.
    #[default]
    Invested,
    /// Invested value plus account cash.
    InvestedPlusCash,
}

/// Result of the turnover gate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TurnoverCheck {
    pub turnover_cents: i64,
    pub denominator_cents: i64,
    pub limit: f64,
    pub passed: bool,
}

impl TurnoverCheck {
    /// Turnover as a fraction of the denominator (0 when the denominator is 0).
    pub fn ratio(&self) -> f64 {
        if self.denominator_cents > 0 {
            self.turnover_cents as f64 / self.denominator_cents as f64
        } else {
            0.0
        }
    }
}

/// Diff engine settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Deltas strictly below this (cents) are skipped.
    pub dust_cents: i64,
    /// Maximum turnover as a fraction of the denominator.
    pub turnover_limit: f64,
    pub turnover_base: TurnoverBase,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            dust_cents: 5_00,
            turnover_limit: 0.25,
            turnover_base: TurnoverBase::Invested,
        }
    }
}

/// Outcome of [`plan_rebalance`].
#[derive(Clone, Debug, PartialEq)]
pub enum RebalancePlan {
    Orders {
        orders: Vec<OrderIntent>,
        turnover: TurnoverCheck,
    },
    /// The gate tripped; nothing may be submitted this cycle.
    TurnoverExceeded(TurnoverCheck),
}

fn current_values(positions: &[PositionSnapshot]) -> FxHashMap<Symbol, i64> {
    let mut map = FxHashMap::default();
    for p in positions {
        *map.entry(p.symbol).or_insert(0) += p.market_value_cents;
    }
    map
}

fn union_symbols(targets: &[(Symbol, i64)], positions: &[PositionSnapshot]) -> BTreeSet<Symbol> {
    targets
        .iter()
        .map(|(s, _)| *s)
        .chain(positions.iter().map(|p| p.symbol))
        .collect()
}

/// Turnover gate.
///
/// `turnover = Σ |target - current|` over every symbol held or targeted. The
/// gate fails when the denominator is positive and turnover is strictly above
/// `limit * denominator`. A zero denominator always passes.
pub fn check_turnover(
    targets: &[(Symbol, i64)],
    positions: &[PositionSnapshot],
    cash_cents: i64,
    base: TurnoverBase,
    limit: f64,
) -> TurnoverCheck {
    let current = current_values(positions);
    let target: FxHashMap<Symbol, i64> = targets.iter().copied().collect();

    let turnover_cents: i64 = union_symbols(targets, positions)
        .iter()
        .map(|s| {
            let t = target.get(s).copied().unwrap_or(0);
            let c = current.get(s).copied().unwrap_or(0);
            (t - c).abs()
        })
        .sum();

    let invested: i64 = positions.iter().map(|p| p.market_value_cents.abs()).sum();
    let denominator_cents = match base {
        TurnoverBase::Invested => invested,
        TurnoverBase::InvestedPlusCash => invested + cash_cents.max(0),
    };

    let passed =
        denominator_cents <= 0 || turnover_cents as f64 <= limit * denominator_cents as f64;

    TurnoverCheck {
        turnover_cents,
        denominator_cents,
        limit,
        passed,
    }
}

/// Build order intents moving `positions` toward `targets`.
///
/// Symbols held but not targeted are sold down to zero. Prices are cents per
/// share and only consulted for whole-share sizing. Output is sells first,
/// then buys, each ascending by symbol, so identical inputs give identical
/// orders.
pub fn compute_orders(
    targets: &[(Symbol, i64)],
    positions: &[PositionSnapshot],
    prices: &FxHashMap<Symbol, i64>,
    fractionable: &FxHashSet<Symbol>,
    dust_cents: i64,
    sink: &dyn EventSink,
) -> Vec<OrderIntent> {
    let current = current_values(positions);
    let target: FxHashMap<Symbol, i64> = targets.iter().copied().collect();

    let mut sells = Vec::new();
    let mut buys = Vec::new();

    // BTreeSet iteration gives ascending symbols within each side.
    for symbol in union_symbols(targets, positions) {
        let delta = target.get(&symbol).copied().unwrap_or(0)
            - current.get(&symbol).copied().unwrap_or(0);
        let magnitude = delta.abs();

        if delta == 0 || magnitude < dust_cents {
            if delta != 0 {
                sink.record(
                    Level::Debug,
                    "dust_skipped",
                    json!({ "symbol": symbol, "delta_cents": delta }),
                );
            }
            continue;
        }

        let side = Side::for_delta(delta);
        let intent = if fractionable.contains(&symbol) {
            OrderIntent::notional(symbol, side, magnitude)
        } else {
            let price = match prices.get(&symbol) {
                Some(&p) if p > 0 => p,
                _ => {
                    sink.record(
                        Level::Warn,
                        "unpriced_skipped",
                        json!({ "symbol": symbol, "delta_cents": delta }),
                    );
                    continue;
                }
            };
            let qty = magnitude / price;
            if qty == 0 {
                sink.record(
                    Level::Debug,
                    "zero_quantity_skipped",
                    json!({ "symbol": symbol, "delta_cents": delta, "price_cents": price }),
                );
                continue;
            }
            OrderIntent::shares(symbol, side, qty as u64)
        };

        match side {
            Side::Sell => sells.push(intent),
            Side::Buy => buys.push(intent),
        }
    }

    sells.extend(buys);
    sells
}

/// Turnover gate followed by the diff.
pub fn plan_rebalance(
    targets: &[(Symbol, i64)],
    positions: &[PositionSnapshot],
    cash_cents: i64,
    prices: &FxHashMap<Symbol, i64>,
    fractionable: &FxHashSet<Symbol>,
    config: &DiffConfig,
    sink: &dyn EventSink,
) -> RebalancePlan {
    let turnover = check_turnover(
        targets,
        positions,
        cash_cents,
        config.turnover_base,
        config.turnover_limit,
    );
    if !turnover.passed {
        sink.record(
            Level::Warn,
            "turnover_exceeded",
            json!({
                "turnover_cents": turnover.turnover_cents,
                "denominator_cents": turnover.denominator_cents,
                "limit": turnover.limit,
            }),
        );
        return RebalancePlan::TurnoverExceeded(turnover);
    }

    let orders = compute_orders(
        targets,
        positions,
        prices,
        fractionable,
        config.dust_cents,
        sink,
    );
    RebalancePlan::Orders { orders, turnover }
}
