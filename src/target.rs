//! Target translator: blended weights to per-symbol dollar targets.

use crate::weights::Weights;
use crate::Symbol;

/// Capital available for positions after the cash buffer and regime scalar,
/// in cents. Never negative.
pub fn investable_capital(equity_cents: i64, cash_buffer: f64, regime_scalar: f64) -> i64 {
    let after_buffer = (equity_cents as f64 * (1.0 - cash_buffer)).max(0.0);
    (after_buffer * regime_scalar).round() as i64
}

/// Target notional per symbol: `investable * weight`, rounded to cents.
///
/// Weights summing below 1 leave the remainder in cash.
pub fn target_notionals(weights: &Weights, investable_cents: i64) -> Vec<(Symbol, i64)> {
    weights
        .iter()
        .map(|(s, w)| (s, (investable_cents as f64 * w).round() as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_and_scalar() {
        // $100,000 equity, 5% buffer, risk-off 0.6
        assert_eq!(investable_capital(10_000_000, 0.05, 0.6), 5_700_000);
        assert_eq!(investable_capital(10_000_000, 0.0, 1.0), 10_000_000);
    }

    #[test]
    fn negative_equity_floors_at_zero() {
        assert_eq!(investable_capital(-500, 0.05, 1.0), 0);
    }

    #[test]
    fn notionals_leave_cash() {
        let w: Weights = [(Symbol::new("A"), 0.25), (Symbol::new("B"), 0.125)]
            .into_iter()
            .collect();
        let t = target_notionals(&w, 1_000_000);
        assert_eq!(t, vec![(Symbol::new("A"), 250_000), (Symbol::new("B"), 125_000)]);
    }

    #[test]
    fn rounds_to_cents() {
        let w: Weights = [(Symbol::new("A"), 1.0 / 3.0)].into_iter().collect();
        assert_eq!(target_notionals(&w, 100)[0].1, 33);
    }
}
