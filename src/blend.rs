//! Weight blender: mixes proposal weights with risk weights.

use serde::{Deserialize, Serialize};

use crate::weights::Weights;

/// How proposal weights are post-processed before targets are built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Blend with volatility-scaled risk weights.
    #[default]
    VolTarget,
    /// Use the proposal weights as given.
    None,
}

/// Blend `ai` and `risk` as `alpha * ai + (1 - alpha) * risk`.
///
/// The union of symbols is visited in `ai` order, then risk-only symbols in
/// `risk` order. Each weight is clamped to `[0, max_weight]`; if the total
/// then exceeds 1 every weight is scaled down proportionally. Names left at
/// zero are dropped.
pub fn blend_weights(ai: &Weights, risk: &Weights, alpha: f64, max_weight: f64) -> Weights {
    let alpha = alpha.clamp(0.0, 1.0);

    let mut out: Weights = ai
        .symbols()
        .chain(risk.symbols().filter(|s| !ai.contains(s)))
        .map(|s| {
            let w = alpha * ai.get(&s) + (1.0 - alpha) * risk.get(&s);
            (s, w.clamp(0.0, max_weight))
        })
        .collect();

    let total = out.total();
    if total > 1.0 {
        out = out.iter().map(|(s, w)| (s, w / total)).collect();
    }
    out.iter().filter(|(_, w)| *w > 0.0).collect()
}

/// Final weights for a cycle under `weighting`.
///
/// Falls back to the proposal weights (alpha = 1) when weighting is
/// [`Weighting::None`] or the risk set is empty.
pub fn final_weights(
    ai: &Weights,
    risk: &Weights,
    weighting: Weighting,
    alpha: f64,
    max_weight: f64,
) -> Weights {
    if weighting == Weighting::None || risk.is_empty() {
        return blend_weights(ai, &Weights::new(), 1.0, max_weight);
    }
    blend_weights(ai, risk, alpha, max_weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;

    fn w(pairs: &[(&str, f64)]) -> Weights {
        pairs.iter().map(|(s, w)| (Symbol::new(s), *w)).collect()
    }

    #[test]
    fn half_and_half() {
        let out = blend_weights(&w(&[("A", 0.4)]), &w(&[("A", 0.2), ("B", 0.2)]), 0.5, 0.5);
        assert!((out.get(&Symbol::new("A")) - 0.3).abs() < 1e-12);
        assert!((out.get(&Symbol::new("B")) - 0.1).abs() < 1e-12);
        let syms: Vec<_> = out.symbols().map(|s| s.to_string()).collect();
        assert_eq!(syms, vec!["A", "B"]);
    }

    #[test]
    fn clamps_then_shrinks() {
        let out = blend_weights(
            &w(&[("A", 0.5), ("B", 0.5), ("C", 0.5)]),
            &Weights::new(),
            1.0,
            0.4,
        );
        assert!((out.total() - 1.0).abs() < 1e-12);
        assert!(out.max_weight() <= 0.4);
        assert!((out.get(&Symbol::new("A")) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn zero_weights_dropped() {
        let out = blend_weights(&w(&[("A", 0.0), ("B", 0.2)]), &Weights::new(), 1.0, 0.5);
        assert_eq!(out.len(), 1);
        assert!(!out.contains(&Symbol::new("A")));
    }

    #[test]
    fn alpha_zero_is_pure_risk() {
        let out = blend_weights(&w(&[("A", 0.5)]), &w(&[("B", 0.3)]), 0.0, 0.5);
        assert!(!out.contains(&Symbol::new("A")));
        assert_eq!(out.get(&Symbol::new("B")), 0.3);
    }

    #[test]
    fn weighting_none_passes_proposal_through() {
        let ai = w(&[("A", 0.3), ("B", 0.2)]);
        let risk = w(&[("A", 0.9)]);
        assert_eq!(final_weights(&ai, &risk, Weighting::None, 0.5, 0.5), ai);
        assert_eq!(final_weights(&ai, &Weights::new(), Weighting::VolTarget, 0.5, 0.5), ai);
    }

    #[test]
    fn weighting_parses() {
        let v: Weighting = serde_json::from_str("\"vol_target\"").unwrap();
        assert_eq!(v, Weighting::VolTarget);
    }
}
