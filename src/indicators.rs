//! Rolling-window time-series helpers used by the feature scorer.
//!
//! # Conventions
//!
//! - Input slices are `&[f64]` (closing prices or simple returns), oldest first.
//! - Output `Vec<f64>` has the same length as input; elements within the
//!   lookback period are filled with `f64::NAN`.
//! - Semantics follow pandas: `pct_change(k)`, `rolling(k).mean()` and
//!   `rolling(k).std()` with `ddof = 1`. A window that contains a NaN yields NaN.

/// Trading days per year used to annualize daily volatility.
pub const TRADING_DAYS: f64 = 252.0;

/// Percentage change over `periods` observations: `x[i] / x[i - periods] - 1`.
pub fn pct_change(values: &[f64], periods: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if periods == 0 {
        return vec![0.0; n];
    }
    for i in periods..n {
        out[i] = values[i] / values[i - periods] - 1.0;
    }
    out
}

/// Simple moving average.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if n < period || period == 0 {
        return out;
    }

    let mut window_sum: f64 = values[..period].iter().sum();
    out[period - 1] = window_sum / period as f64;

    for i in period..n {
        window_sum += values[i] - values[i - period];
        out[i] = window_sum / period as f64;
    }
    out
}

/// Sample standard deviation (`ddof = 1`) over a rolling window.
///
/// Two-pass per window; the series here are a few hundred points long so
/// numerical stability wins over the running-sum trick.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if n < period || period < 2 {
        return out;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let ss: f64 = window.iter().map(|v| (v - mean).powi(2)).sum();
        out[i] = (ss / (period - 1) as f64).sqrt();
    }
    out
}

/// Maximum peak-to-trough drawdown of a price series, as a non-positive
/// fraction (e.g. `-0.25` for a 25% drawdown). Empty input yields NaN.
pub fn max_drawdown(prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return f64::NAN;
    }
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &p in prices {
        if p > peak {
            peak = p;
        }
        let dd = p / peak - 1.0;
        if dd < worst {
            worst = dd;
        }
    }
    worst
}

/// Last element of an indicator series, NaN when empty.
#[inline]
pub fn last(series: &[f64]) -> f64 {
    series.last().copied().unwrap_or(f64::NAN)
}
