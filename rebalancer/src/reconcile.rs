//! Post-submit reconciliation: order status poll and actual vs target weights.

use std::fmt;

use alphabook::{EventSink, PositionSnapshot, Symbol, Weights};
use alphabook_broker::{Broker, BrokerOrderStatus, OrderId};
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::json;

/// Poll the status of every submitted order.
///
/// Failed lookups are recorded and skipped.
pub fn poll_orders(
    broker: &dyn Broker,
    ids: &[OrderId],
    sink: &dyn EventSink,
) -> Vec<BrokerOrderStatus> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        match broker.order_status(id) {
            Ok(status) => {
                sink.info(
                    "order_status",
                    json!({
                        "order_id": id,
                        "status": status.status.as_str(),
                        "filled_qty": status.filled_quantity,
                        "filled_avg_price_cents": status.filled_avg_price_cents,
                    }),
                );
                out.push(status);
            }
            Err(e) => sink.warn(
                "order_status_failed",
                json!({"order_id": id, "error": e.to_string()}),
            ),
        }
    }
    out
}

/// Reconciliation report comparing actual vs target weights.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub entries: Vec<ReconcileEntry>,
    pub tracking_error_pct: f64,
}

/// One symbol's reconciliation entry.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileEntry {
    pub symbol: Symbol,
    pub target_weight: f64,
    pub actual_weight: f64,
    pub diff_weight: f64,
    pub actual_value_cents: i64,
}

/// Compare positions (by market value) against target weights of equity.
pub fn reconcile(
    positions: &[PositionSnapshot],
    targets: &Weights,
    equity_cents: i64,
) -> ReconcileReport {
    let mut actual: FxHashMap<Symbol, i64> = FxHashMap::default();
    for p in positions {
        *actual.entry(p.symbol).or_insert(0) += p.market_value_cents;
    }

    let mut all_symbols: Vec<Symbol> = targets.symbols().collect();
    all_symbols.extend(actual.keys().copied());
    all_symbols.sort();
    all_symbols.dedup();

    let mut entries = Vec::with_capacity(all_symbols.len());
    let mut sum_sq_diff = 0.0_f64;

    for sym in &all_symbols {
        let value = actual.get(sym).copied().unwrap_or(0);
        let target_weight = targets.get(sym);
        let actual_weight = if equity_cents > 0 {
            value as f64 / equity_cents as f64
        } else {
            0.0
        };
        let diff_weight = actual_weight - target_weight;
        sum_sq_diff += diff_weight * diff_weight;

        entries.push(ReconcileEntry {
            symbol: *sym,
            target_weight,
            actual_weight,
            diff_weight,
            actual_value_cents: value,
        });
    }

    let tracking_error_pct = (sum_sq_diff / all_symbols.len().max(1) as f64).sqrt() * 100.0;

    ReconcileReport {
        entries,
        tracking_error_pct,
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RECONCILIATION:")?;
        writeln!(
            f,
            "  {:8} {:>10} {:>10} {:>10} {:>14}",
            "Symbol", "Target%", "Actual%", "Diff%", "Value"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:8} {:>9.2}% {:>9.2}% {:>+9.2}% {:>14.2}",
                e.symbol.as_str(),
                e.target_weight * 100.0,
                e.actual_weight * 100.0,
                e.diff_weight * 100.0,
                e.actual_value_cents as f64 / 100.0,
            )?;
        }
        writeln!(f, "\n  Tracking error: {:.3}%", self.tracking_error_pct)?;
        Ok(())
    }
}
