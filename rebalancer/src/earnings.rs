//! Earnings-date blackout.

use std::path::PathBuf;

use alphabook::{EventSink, ProposedAllocation, Symbol};
use chrono::{Duration, NaiveDate};
use rustc_hash::FxHashMap;
use serde_json::json;

use crate::error::{Error, Result};

/// Source of upcoming earnings dates.
pub trait EarningsCalendar {
    /// Next earnings date per symbol. Symbols without a known date are absent.
    fn next_earnings(&self, symbols: &[Symbol]) -> Result<FxHashMap<Symbol, NaiveDate>>;
}

/// Calendar read from a JSON object `{"AAPL": "2026-04-30", ...}`.
#[derive(Debug, Clone)]
pub struct FileCalendar {
    path: PathBuf,
}

impl FileCalendar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EarningsCalendar for FileCalendar {
    fn next_earnings(&self, symbols: &[Symbol]) -> Result<FxHashMap<Symbol, NaiveDate>> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Earnings(format!("cannot read {}: {e}", self.path.display())))?;
        let all: FxHashMap<Symbol, NaiveDate> = serde_json::from_str(&text)
            .map_err(|e| Error::Earnings(format!("bad calendar {}: {e}", self.path.display())))?;
        Ok(symbols
            .iter()
            .filter_map(|s| all.get(s).map(|d| (*s, *d)))
            .collect())
    }
}

/// True when `earnings` falls in `[today - days_after, today + days_before]`.
pub fn in_blackout(earnings: NaiveDate, today: NaiveDate, days_before: i64, days_after: i64) -> bool {
    earnings >= today - Duration::days(days_after) && earnings <= today + Duration::days(days_before)
}

/// Drop picks inside their earnings blackout. Returns the removed symbols.
pub fn apply_blackout(
    allocation: &mut ProposedAllocation,
    calendar: &FxHashMap<Symbol, NaiveDate>,
    today: NaiveDate,
    days_before: i64,
    days_after: i64,
    sink: &dyn EventSink,
) -> Vec<Symbol> {
    let mut removed = Vec::new();
    allocation.retain_picks(|p| match calendar.get(&p.symbol) {
        Some(&date) if in_blackout(date, today, days_before, days_after) => {
            sink.info(
                "blocked_by_earnings",
                json!({"symbol": p.symbol, "earnings_date": date.to_string()}),
            );
            removed.push(p.symbol);
            false
        }
        _ => true,
    });
    removed
}
