//! Market regime detection: breadth and benchmark trend to a risk scalar.

use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;
use crate::Symbol;

/// Breadth below this fraction flips the regime to risk-off.
pub const RISK_OFF_BREADTH: f64 = 0.40;

/// Regime filter settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// When false the scalar is always 1.0.
    pub enabled: bool,
    /// Investable-capital multiplier applied in risk-off (< 1.0).
    pub risk_off_scalar: f64,
    /// Benchmark whose trend gates the regime.
    pub benchmark: Symbol,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            risk_off_scalar: 0.6,
            benchmark: Symbol::new("SPY"),
        }
    }
}

/// Regime read for one cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Regime {
    pub breadth: f64,
    pub benchmark_trend: f64,
    pub benchmark_vol: f64,
    pub risk_off: bool,
    /// Multiplier on investable capital for this cycle only.
    pub scalar: f64,
}

/// Fraction of scored symbols with a positive trend (0.0 for an empty set).
pub fn breadth(rows: &[FeatureRow]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().filter(|r| r.trend > 0.0).count() as f64 / rows.len() as f64
}

/// Detect the regime from the scored universe.
///
/// Benchmark trend and volatility default to zero when the benchmark is not
/// in the scored set, which alone does not trigger risk-off.
pub fn detect_regime(rows: &[FeatureRow], config: &RegimeConfig) -> Regime {
    let breadth = breadth(rows);
    let (benchmark_trend, benchmark_vol) = rows
        .iter()
        .find(|r| r.symbol == config.benchmark)
        .map(|r| (r.trend, r.vol20_annual))
        .unwrap_or((0.0, 0.0));

    let risk_off =
        config.enabled && (benchmark_trend < 0.0 || breadth < RISK_OFF_BREADTH);

    Regime {
        breadth,
        benchmark_trend,
        benchmark_vol,
        risk_off,
        scalar: if risk_off { config.risk_off_scalar } else { 1.0 },
    }
}
