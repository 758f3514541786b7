//! Append-only persistence for episodes and submitted orders.
//!
//! [`JsonlStore`] keeps one JSON object per line, one file per record kind.
//! Records are never rewritten; readers skip lines that fail to parse.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use alphabook::memory::{Episode, EquitySample};
use alphabook::{OrderIntent, Side, Symbol};
use alphabook_broker::{OrderAck, OrderId, OrderState};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// One submitted order, linked to its cycle by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Cycle timestamp (matches the episode's `asof`).
    pub asof: DateTime<Utc>,
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub notional_cents: Option<i64>,
    pub quantity: Option<u64>,
    pub status: OrderState,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    pub fn new(asof: DateTime<Utc>, order: &OrderIntent, ack: &OrderAck) -> Self {
        Self {
            asof,
            order_id: ack.id.clone(),
            symbol: order.symbol,
            side: order.side,
            notional_cents: order.notional_cents(),
            quantity: order.quantity(),
            status: ack.status,
            submitted_at: ack.submitted_at,
        }
    }
}

/// Persistence collaborator for the cycle.
pub trait EpisodeStore {
    fn append_episode(&self, episode: &Episode) -> Result<()>;

    fn append_order(&self, order: &OrderRecord) -> Result<()>;

    /// Up to `n` most recent episodes, newest first.
    fn recent_episodes(&self, n: usize) -> Result<Vec<Episode>>;

    /// Up to `limit` most recent equity samples, oldest first.
    fn equity_series(&self, limit: usize) -> Result<Vec<EquitySample>>;

    /// Up to `limit` most recent order records, newest first.
    fn recent_orders(&self, limit: usize) -> Result<Vec<OrderRecord>>;
}

/// JSON-lines store: `episodes.jsonl` and `orders.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    episodes: PathBuf,
    orders: PathBuf,
}

impl JsonlStore {
    pub fn new(episodes: impl Into<PathBuf>, orders: impl Into<PathBuf>) -> Self {
        Self {
            episodes: episodes.into(),
            orders: orders.into(),
        }
    }

    /// Store with the default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("episodes.jsonl"), dir.join("orders.jsonl"))
    }
}

fn store_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Store {
        path: path.to_path_buf(),
        source,
    }
}

fn append<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(store_err(path))?;
    }
    let line = serde_json::to_string(record)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(store_err(path))?;
    writeln!(file, "{line}").map_err(store_err(path))?;
    Ok(())
}

/// Every parseable record in file order. A missing file is empty.
fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(store_err(path)(e)),
    };

    let mut out = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(store_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => out.push(record),
            Err(e) => warn!("{}:{}: skipping malformed record: {e}", path.display(), i + 1),
        }
    }
    Ok(out)
}

impl EpisodeStore for JsonlStore {
    fn append_episode(&self, episode: &Episode) -> Result<()> {
        append(&self.episodes, episode)
    }

    fn append_order(&self, order: &OrderRecord) -> Result<()> {
        append(&self.orders, order)
    }

    fn recent_episodes(&self, n: usize) -> Result<Vec<Episode>> {
        let mut all: Vec<Episode> = read_all(&self.episodes)?;
        all.sort_by(|a, b| b.asof.cmp(&a.asof));
        all.truncate(n);
        Ok(all)
    }

    fn equity_series(&self, limit: usize) -> Result<Vec<EquitySample>> {
        let episodes: Vec<Episode> = read_all(&self.episodes)?;
        let mut samples: Vec<EquitySample> = episodes.iter().map(Episode::equity_sample).collect();
        samples.sort_by_key(|s| s.asof);
        let skip = samples.len().saturating_sub(limit);
        Ok(samples.split_off(skip))
    }

    fn recent_orders(&self, limit: usize) -> Result<Vec<OrderRecord>> {
        let mut all: Vec<OrderRecord> = read_all(&self.orders)?;
        all.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.asof.cmp(&a.asof)));
        all.truncate(limit);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alphabook::proposal::{Pick, ProposalConstraints};
    use chrono::TimeZone;

    fn episode(day: u32, equity_cents: i64) -> Episode {
        Episode {
            asof: Utc.with_ymd_and_hms(2026, 3, day, 16, 50, 0).unwrap(),
            window_tag: "am".into(),
            equity_cents,
            cash_cents: 1_000_00,
            constraints: ProposalConstraints {
                max_positions: 5,
                max_weight: 0.25,
            },
            top_panel: Vec::new(),
            picks: vec![Pick {
                symbol: Symbol::new("SPY"),
                weight: 0.25,
                rationale: "trend".into(),
            }],
            notes: String::new(),
            confidence: 0.6,
        }
    }

    #[test]
    fn missing_files_read_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::in_dir(dir.path());
        assert!(store.recent_episodes(5).unwrap().is_empty());
        assert!(store.equity_series(10).unwrap().is_empty());
        assert!(store.recent_orders(10).unwrap().is_empty());
    }

    #[test]
    fn recent_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::in_dir(&dir.path().join("nested"));
        // Appended out of order.
        for (day, eq) in [(3, 300), (1, 100), (4, 400), (2, 200)] {
            store.append_episode(&episode(day, eq)).unwrap();
        }

        let recent = store.recent_episodes(3).unwrap();
        let equities: Vec<i64> = recent.iter().map(|e| e.equity_cents).collect();
        assert_eq!(equities, vec![400, 300, 200]);
        assert_eq!(recent[0].picks[0].symbol, Symbol::new("SPY"));
    }

    #[test]
    fn equity_series_is_ascending_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::in_dir(dir.path());
        for (day, eq) in [(3, 300), (1, 100), (4, 400), (2, 200)] {
            store.append_episode(&episode(day, eq)).unwrap();
        }

        let all: Vec<i64> = store
            .equity_series(100)
            .unwrap()
            .iter()
            .map(|s| s.equity_cents)
            .collect();
        assert_eq!(all, vec![100, 200, 300, 400]);

        let last_two: Vec<i64> = store
            .equity_series(2)
            .unwrap()
            .iter()
            .map(|s| s.equity_cents)
            .collect();
        assert_eq!(last_two, vec![300, 400]);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::in_dir(dir.path());
        store.append_episode(&episode(1, 100)).unwrap();
        let mut f = OpenOptions::new()
            .append(true)
            .open(dir.path().join("episodes.jsonl"))
            .unwrap();
        writeln!(f, "{{not json").unwrap();
        writeln!(f).unwrap();
        store.append_episode(&episode(2, 200)).unwrap();

        assert_eq!(store.recent_episodes(10).unwrap().len(), 2);
    }

    #[test]
    fn order_records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::in_dir(dir.path());
        let asof = Utc.with_ymd_and_hms(2026, 3, 4, 16, 50, 0).unwrap();
        let order = OrderIntent::notional(Symbol::new("QQQ"), Side::Buy, 1_250_00);
        let ack = OrderAck {
            id: OrderId("abc".into()),
            status: OrderState::Accepted,
            submitted_at: Some(asof),
        };
        store.append_order(&OrderRecord::new(asof, &order, &ack)).unwrap();

        let orders = store.recent_orders(5).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].notional_cents, Some(1_250_00));
        assert_eq!(orders[0].quantity, None);
        assert_eq!(orders[0].order_id.0, "abc");
    }
}
