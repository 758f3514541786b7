//! Daily bars and per-symbol bar histories.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::Symbol;

/// One symbol's daily OHLCV observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    /// Trading-day timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bars grouped by symbol, each series strictly ordered by timestamp.
///
/// Symbols iterate in ascending ticker order so that downstream scoring is
/// deterministic regardless of the order bars arrived from the data source.
#[derive(Clone, Debug, Default)]
pub struct BarHistory {
    series: BTreeMap<Symbol, Vec<Bar>>,
}

impl BarHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from bars in any order.
    ///
    /// Bars are grouped by symbol and sorted by timestamp. Two bars with the
    /// same (symbol, timestamp) key are rejected.
    pub fn from_bars<I>(bars: I) -> Result<Self>
    where
        I: IntoIterator<Item = Bar>,
    {
        let mut series: BTreeMap<Symbol, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            series.entry(bar.symbol).or_default().push(bar);
        }

        for (symbol, bars) in series.iter_mut() {
            bars.sort_by_key(|b| b.timestamp);
            if let Some(pair) = bars.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
                return Err(Error::DuplicateBar {
                    symbol: *symbol,
                    timestamp: pair[1].timestamp,
                });
            }
        }

        Ok(Self { series })
    }

    /// Append a bar. It must be strictly after the symbol's last bar.
    pub fn push(&mut self, bar: Bar) -> Result<()> {
        let bars = self.series.entry(bar.symbol).or_default();
        if let Some(last) = bars.last() {
            if bar.timestamp <= last.timestamp {
                return Err(Error::OutOfOrderBar {
                    symbol: bar.symbol,
                    timestamp: bar.timestamp,
                    previous: last.timestamp,
                });
            }
        }
        bars.push(bar);
        Ok(())
    }

    /// Symbols with at least one bar, ascending.
    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.series.keys().copied()
    }

    /// Bars for `symbol`, oldest first.
    pub fn bars(&self, symbol: &Symbol) -> Option<&[Bar]> {
        self.series.get(symbol).map(Vec::as_slice)
    }

    /// Close prices for `symbol`, oldest first.
    pub fn closes(&self, symbol: &Symbol) -> Option<Vec<f64>> {
        self.bars(symbol)
            .map(|bars| bars.iter().map(|b| b.close).collect())
    }

    /// Iterate `(symbol, bars)` pairs in ticker order.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &[Bar])> + '_ {
        self.series.iter().map(|(s, b)| (*s, b.as_slice()))
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
