//! Pre-submit checks.
//!
//! Last line of defence between the diff and the broker: the blended weights
//! must respect the single-name cap and sum to at most 1, and the order list
//! must fit the per-run limit. Any failure aborts the cycle before anything
//! is cancelled or submitted.

use std::fmt;

use alphabook::{OrderIntent, OrderSize, Side, Symbol, Weights, to_dollars};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Slack for floating-point weight sums.
const WEIGHT_EPS: f64 = 1e-9;

/// Result of running all checks.
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub checks: Vec<RiskCheck>,
}

/// A single check result.
#[derive(Debug, Clone, Serialize)]
pub struct RiskCheck {
    pub name: &'static str,
    pub status: RiskStatus,
    pub detail: String,
}

/// Whether a check passed, warned, or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskStatus::Pass => write!(f, "PASS"),
            RiskStatus::Warn => write!(f, "WARN"),
            RiskStatus::Fail => write!(f, "FAIL"),
        }
    }
}

impl RiskReport {
    /// True if any check failed (not just warned).
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == RiskStatus::Fail)
    }

    pub fn has_warnings(&self) -> bool {
        self.checks.iter().any(|c| c.status == RiskStatus::Warn)
    }

    /// Details of the failed checks, joined with `; `.
    pub fn failures(&self) -> String {
        self.checks
            .iter()
            .filter(|c| c.status == RiskStatus::Fail)
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for RiskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RISK CHECKS:")?;
        for check in &self.checks {
            writeln!(f, "  [{}] {}: {}", check.status, check.name, check.detail)?;
        }
        Ok(())
    }
}

/// Limits applied by [`check_pre_submit`].
#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    pub max_weight: f64,
    pub max_orders: usize,
    pub buying_power_cents: i64,
}

fn pass_or_fail(ok: bool) -> RiskStatus {
    if ok { RiskStatus::Pass } else { RiskStatus::Fail }
}

/// Estimated cash effect of an order, in cents.
fn estimated_cents(order: &OrderIntent, prices: &FxHashMap<Symbol, i64>) -> i64 {
    match order.size {
        OrderSize::Notional(cents) => cents,
        OrderSize::Shares(q) => prices.get(&order.symbol).copied().unwrap_or(0) * q as i64,
    }
}

/// Run all pre-submit checks.
pub fn check_pre_submit(
    weights: &Weights,
    orders: &[OrderIntent],
    prices: &FxHashMap<Symbol, i64>,
    limits: &RiskLimits,
) -> RiskReport {
    let mut checks = Vec::new();

    let (worst_sym, worst) = weights
        .iter()
        .fold((None, 0.0_f64), |(s, w), (sym, wt)| {
            if wt > w { (Some(sym), wt) } else { (s, w) }
        });
    let ok = worst <= limits.max_weight + WEIGHT_EPS;
    checks.push(RiskCheck {
        name: "Max weight",
        status: pass_or_fail(ok),
        detail: format!(
            "{:.1}% ({}) {} {:.1}% limit",
            worst * 100.0,
            worst_sym.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            if ok { "<=" } else { ">" },
            limits.max_weight * 100.0,
        ),
    });

    let total = weights.total();
    let ok = total <= 1.0 + WEIGHT_EPS;
    checks.push(RiskCheck {
        name: "Total weight",
        status: pass_or_fail(ok),
        detail: format!(
            "{:.1}% invested, {:.1}% cash",
            total * 100.0,
            (1.0 - total) * 100.0
        ),
    });

    let ok = orders.len() <= limits.max_orders;
    checks.push(RiskCheck {
        name: "Order count",
        status: pass_or_fail(ok),
        detail: format!(
            "{} orders {} {} limit",
            orders.len(),
            if ok { "<=" } else { ">" },
            limits.max_orders
        ),
    });

    // Sells settle before buys only approximately; a shortfall is a warning.
    let (buys, sells) = orders.iter().fold((0_i64, 0_i64), |(b, s), o| {
        let cents = estimated_cents(o, prices);
        match o.side {
            Side::Buy => (b + cents, s),
            Side::Sell => (b, s + cents),
        }
    });
    let available = limits.buying_power_cents + sells;
    checks.push(RiskCheck {
        name: "Buying power",
        status: if buys <= available {
            RiskStatus::Pass
        } else {
            RiskStatus::Warn
        },
        detail: format!(
            "${:.2} buys vs ${:.2} buying power + ${:.2} sells",
            to_dollars(buys),
            to_dollars(limits.buying_power_cents),
            to_dollars(sells)
        ),
    });

    RiskReport { checks }
}
