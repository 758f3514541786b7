//! Risk allocator: volatility-scaled weights for the proposed names,
//! independent of the weights the proposer chose.

use rustc_hash::FxHashSet;

use crate::features::FeatureRow;
use crate::proposal::Pick;
use crate::weights::Weights;
use crate::Symbol;

/// Floor applied to annualized volatility before dividing by it.
pub const VOL_FLOOR: f64 = 1e-4;

/// Remaining capacity below which water-filling stops.
pub const FILL_EPSILON: f64 = 1e-6;

/// Risk weights for `picks`.
///
/// Each pick found in `rows` gets affinity `max(score, 0) / max(vol20, floor)`.
/// Affinities are normalized to sum 1 and capped at `max_weight`. If the
/// capped set still sums above 1 it is [`water_fill`]ed. Candidates are
/// visited in `rows` order, which makes that the tie-break.
///
/// Returns an empty set when no pick is scored or every affinity is zero.
pub fn risk_weights(picks: &[Pick], rows: &[FeatureRow], max_weight: f64) -> Weights {
    let wanted: FxHashSet<Symbol> = picks.iter().map(|p| p.symbol).collect();

    let raw: Vec<(Symbol, f64)> = rows
        .iter()
        .filter(|r| wanted.contains(&r.symbol))
        .map(|r| (r.symbol, r.score.max(0.0) / r.vol20_annual.max(VOL_FLOOR)))
        .collect();

    let sum: f64 = raw.iter().map(|(_, a)| a).sum();
    if raw.is_empty() || sum <= 0.0 || !sum.is_finite() {
        return Weights::new();
    }

    let capped: Vec<(Symbol, f64)> = raw
        .into_iter()
        .map(|(s, a)| (s, (a / sum).min(max_weight)))
        .collect();

    if capped.iter().map(|(_, w)| w).sum::<f64>() > 1.0 {
        return water_fill(&capped, max_weight);
    }
    capped.into_iter().collect()
}

/// Greedy capped water-filling.
///
/// Visits candidates by weight, largest first (stable), assigning each
/// `min(weight, cap, remaining)` until less than [`FILL_EPSILON`] of the unit
/// budget remains. Names past that point are left out. The result sums to at
/// most 1 and no entry exceeds `cap`.
pub fn water_fill(weights: &[(Symbol, f64)], cap: f64) -> Weights {
    let mut order: Vec<&(Symbol, f64)> = weights.iter().collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut remaining = 1.0_f64;
    let mut out = Weights::new();
    for &(symbol, weight) in order {
        let take = weight.min(cap).min(remaining).max(0.0);
        out.set(symbol, take);
        remaining -= take;
        if remaining <= FILL_EPSILON {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(sym: &str, score: f64, vol: f64) -> FeatureRow {
        FeatureRow {
            symbol: Symbol::new(sym),
            ret21: 0.0,
            ret63: 0.0,
            ret126: 0.0,
            vol20_annual: vol,
            vol63_annual: 0.0,
            maxdd: 0.0,
            trend: 0.0,
            qual126: 0.0,
            score,
            last: 100.0,
        }
    }

    fn pick(sym: &str) -> Pick {
        Pick {
            symbol: Symbol::new(sym),
            weight: 0.1,
            rationale: String::new(),
        }
    }

    #[test]
    fn water_fill_caps_largest_first() {
        let w = water_fill(
            &[
                (Symbol::new("A"), 0.5),
                (Symbol::new("B"), 0.3),
                (Symbol::new("C"), 0.3),
            ],
            0.4,
        );
        assert!((w.get(&Symbol::new("A")) - 0.4).abs() < 1e-12);
        assert!((w.get(&Symbol::new("B")) - 0.3).abs() < 1e-12);
        assert!((w.get(&Symbol::new("C")) - 0.3).abs() < 1e-12);
        assert!(w.total() <= 1.0 + 1e-12);
    }

    #[test]
    fn water_fill_stops_when_budget_exhausted() {
        let w = water_fill(
            &[
                (Symbol::new("A"), 0.6),
                (Symbol::new("B"), 0.6),
                (Symbol::new("C"), 0.6),
            ],
            0.5,
        );
        assert_eq!(w.len(), 2);
        assert!((w.total() - 1.0).abs() < 1e-12);
        assert!(!w.contains(&Symbol::new("C")));
    }

    #[test]
    fn affinity_favors_low_vol() {
        let rows = vec![row("A", 0.2, 0.10), row("B", 0.2, 0.40)];
        let w = risk_weights(&[pick("A"), pick("B")], &rows, 1.0);
        assert!((w.get(&Symbol::new("A")) - 0.8).abs() < 1e-12);
        assert!((w.get(&Symbol::new("B")) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn caps_single_name() {
        let rows = vec![row("A", 0.2, 0.10), row("B", 0.2, 0.40)];
        let w = risk_weights(&[pick("A"), pick("B")], &rows, 0.5);
        assert_eq!(w.get(&Symbol::new("A")), 0.5);
        assert!(w.total() <= 1.0);
    }

    #[test]
    fn unscored_picks_dropped_and_negative_scores_zeroed() {
        let rows = vec![row("A", 0.3, 0.2), row("B", -0.1, 0.2)];
        let w = risk_weights(&[pick("A"), pick("B"), pick("ZZZ")], &rows, 1.0);
        assert_eq!(w.get(&Symbol::new("A")), 1.0);
        assert_eq!(w.get(&Symbol::new("B")), 0.0);
        assert!(!w.contains(&Symbol::new("ZZZ")));
    }

    #[test]
    fn empty_when_nothing_positive() {
        let rows = vec![row("A", -0.3, 0.2)];
        assert!(risk_weights(&[pick("A")], &rows, 0.2).is_empty());
        assert!(risk_weights(&[], &rows, 0.2).is_empty());
    }

    #[test]
    fn zero_vol_uses_floor() {
        let rows = vec![row("A", 0.1, 0.0), row("B", 0.1, 0.2)];
        let w = risk_weights(&[pick("A"), pick("B")], &rows, 1.0);
        assert!(w.get(&Symbol::new("A")) > 0.99);
    }
}
