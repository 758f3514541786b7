//! Ordered symbol → weight lists.

use serde::ser::{Serialize, Serializer};

use crate::Symbol;

/// Ordered list of `(symbol, weight)` pairs, at most one entry per symbol.
///
/// Order is meaningful: it is the order picks were proposed or ranked in, and
/// it decides tie-breaks in the allocator and the blender's union order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Weights {
    entries: Vec<(Symbol, f64)>,
}

impl Weights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `symbol` to `weight`, appending if not present.
    pub fn set(&mut self, symbol: Symbol, weight: f64) {
        match self.entries.iter_mut().find(|(s, _)| *s == symbol) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((symbol, weight)),
        }
    }

    /// Weight for `symbol`, 0.0 when absent.
    pub fn get(&self, symbol: &Symbol) -> f64 {
        self.entries
            .iter()
            .find(|(s, _)| s == symbol)
            .map_or(0.0, |(_, w)| *w)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.entries.iter().any(|(s, _)| s == symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.entries.iter().map(|(s, _)| *s)
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    /// Largest single weight, 0.0 when empty.
    pub fn max_weight(&self) -> f64 {
        self.entries.iter().map(|(_, w)| *w).fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[(Symbol, f64)] {
        &self.entries
    }
}

impl FromIterator<(Symbol, f64)> for Weights {
    fn from_iter<I: IntoIterator<Item = (Symbol, f64)>>(iter: I) -> Self {
        let mut weights = Weights::new();
        for (symbol, weight) in iter {
            weights.set(symbol, weight);
        }
        weights
    }
}

impl Serialize for Weights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(s, w)| (s.as_str(), w)))
    }
}
