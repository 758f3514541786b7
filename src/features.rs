//! Feature scorer: per-symbol momentum, trend, quality and risk metrics.
//!
//! Converts a multi-symbol daily price history into one [`FeatureRow`] per
//! eligible symbol, sorted by composite score (best first).
//!
//! # Metrics
//!
//! For a close series `px` of length `n`:
//!
//! | metric | definition |
//! |--------|------------|
//! | `ret21`, `ret63`, `ret126` | `px[n-1] / px[n-1-k] - 1` |
//! | `vol20_annual`, `vol63_annual` | sample std of the last 20/63 daily returns × √252 |
//! | `maxdd` | worst `px / running_max - 1` over the whole window |
//! | `trend` | `(sma20 - sma50) / sma50`, 0 when `sma50 == 0` |
//! | `qual126` | `ret126 / vol63_annual` |
//!
//! `ret126`, `vol63_annual` and `qual126` are secondary: when undefined they
//! fall back to 0. Any other undefined value drops the whole row.

use serde::{Deserialize, Serialize};

use crate::bar::BarHistory;
use crate::indicators::{self, TRADING_DAYS};
use crate::Symbol;

/// Minimum number of daily bars before a symbol is scored at all.
pub const MIN_HISTORY: usize = 60;

const W_RET63: f64 = 0.28;
const W_RET21: f64 = 0.28;
const W_TREND: f64 = 0.28;
const W_QUAL: f64 = 0.16;
const W_VOL: f64 = 0.12;
const W_DRAWDOWN: f64 = 0.08;

/// Derived metrics for one symbol. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub symbol: Symbol,
    pub ret21: f64,
    pub ret63: f64,
    pub ret126: f64,
    pub vol20_annual: f64,
    pub vol63_annual: f64,
    /// Maximum drawdown, non-positive.
    pub maxdd: f64,
    pub trend: f64,
    pub qual126: f64,
    pub score: f64,
    /// Most recent close.
    pub last: f64,
}

/// The subset of a [`FeatureRow`] shown to the allocation proposer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub symbol: Symbol,
    pub score: f64,
    pub ret21: f64,
    pub ret63: f64,
    pub vol20_annual: f64,
    pub trend: f64,
    pub last: f64,
    pub qual126: f64,
}

impl FeatureRow {
    /// Composite score from the individual metrics.
    pub fn composite(
        ret21: f64,
        ret63: f64,
        trend: f64,
        qual126: f64,
        vol20_annual: f64,
        maxdd: f64,
    ) -> f64 {
        W_RET63 * ret63 + W_RET21 * ret21 + W_TREND * trend + W_QUAL * qual126
            - W_VOL * vol20_annual
            - W_DRAWDOWN * maxdd.abs()
    }

    /// Project onto the proposer-facing panel.
    pub fn panel(&self) -> PanelRow {
        PanelRow {
            symbol: self.symbol,
            score: self.score,
            ret21: self.ret21,
            ret63: self.ret63,
            vol20_annual: self.vol20_annual,
            trend: self.trend,
            last: self.last,
            qual126: self.qual126,
        }
    }

    fn is_defined(&self) -> bool {
        [
            self.ret21,
            self.ret63,
            self.ret126,
            self.vol20_annual,
            self.vol63_annual,
            self.maxdd,
            self.trend,
            self.qual126,
            self.score,
            self.last,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Score a single close series. Returns `None` for short histories and for
/// rows with an undefined required metric.
pub fn score_series(symbol: Symbol, closes: &[f64]) -> Option<FeatureRow> {
    if closes.len() < MIN_HISTORY {
        return None;
    }

    let returns = indicators::pct_change(closes, 1);
    let annualize = TRADING_DAYS.sqrt();

    let ret21 = indicators::last(&indicators::pct_change(closes, 21));
    let ret63 = indicators::last(&indicators::pct_change(closes, 63));
    let vol20_annual = indicators::last(&indicators::rolling_std(&returns, 20)) * annualize;
    let maxdd = indicators::max_drawdown(closes);

    let ma20 = indicators::last(&indicators::sma(closes, 20));
    let ma50 = indicators::last(&indicators::sma(closes, 50));
    let trend = if ma50 != 0.0 { (ma20 - ma50) / ma50 } else { 0.0 };

    let ret126 = indicators::last(&indicators::pct_change(closes, 126));
    let vol63_annual = indicators::last(&indicators::rolling_std(&returns, 63)) * annualize;
    let qual126 = if vol63_annual.is_finite() && vol63_annual != 0.0 {
        ret126 / vol63_annual
    } else {
        f64::NAN
    };

    let ret126 = or_zero(ret126);
    let vol63_annual = or_zero(vol63_annual);
    let qual126 = or_zero(qual126);

    let row = FeatureRow {
        symbol,
        ret21,
        ret63,
        ret126,
        vol20_annual,
        vol63_annual,
        maxdd,
        trend,
        qual126,
        score: FeatureRow::composite(ret21, ret63, trend, qual126, vol20_annual, maxdd),
        last: closes[closes.len() - 1],
    };

    row.is_defined().then_some(row)
}

/// Score every symbol in `history`, best score first.
///
/// Ties keep ascending ticker order. With the `parallel` feature the symbols
/// are scored on the rayon pool; the output is identical.
pub fn score_features(history: &BarHistory) -> Vec<FeatureRow> {
    let series: Vec<(Symbol, Vec<f64>)> = history
        .iter()
        .filter(|(_, bars)| bars.len() >= MIN_HISTORY)
        .map(|(sym, bars)| (sym, bars.iter().map(|b| b.close).collect()))
        .collect();

    #[cfg(feature = "parallel")]
    let mut rows: Vec<FeatureRow> = {
        use rayon::prelude::*;
        series
            .par_iter()
            .filter_map(|(sym, closes)| score_series(*sym, closes))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let mut rows: Vec<FeatureRow> = series
        .iter()
        .filter_map(|(sym, closes)| score_series(*sym, closes))
        .collect();

    rows.sort_by(|a, b| b.score.total_cmp(&a.score));
    rows
}

/// The `n` best rows as a proposer panel.
pub fn top_panel(rows: &[FeatureRow], n: usize) -> Vec<PanelRow> {
    rows.iter().take(n).map(FeatureRow::panel).collect()
}

#[inline]
fn or_zero(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v }
}
