//! Alpaca broker implementation.

pub mod client;
pub mod types;

use alphabook::{Bar, OrderIntent, OrderSize, PositionSnapshot, Symbol, to_cents};
use chrono::{Duration, SecondsFormat, Utc};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;
use client::AlpacaClient;
use types::{BarEntry, OrderRequest, OrderResponse};

/// Symbols per market-data request.
const SYMBOL_BATCH: usize = 100;

/// Alpaca broker implementing the generic Broker trait.
///
/// Uses REST for all operations. Blocking (sync) via reqwest::blocking.
pub struct AlpacaBroker {
    key_id: String,
    secret_key: String,
    trading_url: String,
    feed: String,
    client: Option<AlpacaClient>,
}

impl AlpacaBroker {
    /// Create a new Alpaca broker handle (not yet connected).
    ///
    /// `paper` selects the paper-trading endpoint.
    pub fn new(key_id: &str, secret_key: &str, paper: bool) -> Self {
        let url = if paper { client::PAPER_URL } else { client::LIVE_URL };
        Self {
            key_id: key_id.to_string(),
            secret_key: secret_key.to_string(),
            trading_url: url.to_string(),
            feed: "iex".to_string(),
            client: None,
        }
    }

    /// Override the trading base URL.
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.trading_url = url.to_string();
        self
    }

    /// Set the market-data feed (default `iex`).
    pub fn with_feed(mut self, feed: &str) -> Self {
        self.feed = feed.to_string();
        self
    }

    fn require_client(&self) -> Result<&AlpacaClient, BrokerError> {
        self.client.as_ref().ok_or(BrokerError::NotConnected)
    }
}

/// Parse a decimal string to cents (e.g., "185.50" → 18550).
pub fn parse_cents(s: &str) -> Result<i64, BrokerError> {
    s.trim()
        .parse::<f64>()
        .map(to_cents)
        .map_err(|_| BrokerError::Parse(format!("not a decimal amount: {s:?}")))
}

fn parse_f64(s: &str) -> Result<f64, BrokerError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| BrokerError::Parse(format!("not a number: {s:?}")))
}

fn symbol(s: &str) -> Result<Symbol, BrokerError> {
    Symbol::try_new(s).ok_or_else(|| BrokerError::InvalidSymbol(s.to_string()))
}

/// Convert an order intent to Alpaca's order body (market, day).
pub fn order_request(order: &OrderIntent) -> OrderRequest {
    let (notional, qty) = match order.size {
        OrderSize::Notional(cents) => (Some(format!("{:.2}", cents as f64 / 100.0)), None),
        OrderSize::Shares(q) => (None, Some(q.to_string())),
    };
    OrderRequest {
        symbol: order.symbol.as_str().to_string(),
        notional,
        qty,
        side: order.side.as_str(),
        order_type: "market",
        time_in_force: "day",
    }
}

/// Convert an Alpaca order object to a status snapshot.
pub fn order_status_from(resp: &OrderResponse) -> Result<BrokerOrderStatus, BrokerError> {
    let filled_quantity = match resp.filled_qty.as_deref() {
        Some(q) => parse_f64(q)?,
        None => 0.0,
    };
    let filled_avg_price_cents = resp
        .filled_avg_price
        .as_deref()
        .map(parse_cents)
        .transpose()?;
    Ok(BrokerOrderStatus {
        id: OrderId(resp.id.clone()),
        status: OrderState::from_wire(&resp.status),
        filled_quantity,
        filled_avg_price_cents,
        filled_at: resp.filled_at,
    })
}

fn to_bar(symbol: Symbol, e: &BarEntry) -> Bar {
    Bar {
        symbol,
        timestamp: e.t,
        open: e.o,
        high: e.h,
        low: e.l,
        close: e.c,
        volume: e.v,
    }
}

fn join(symbols: &[Symbol]) -> String {
    symbols
        .iter()
        .map(Symbol::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

impl Broker for AlpacaBroker {
    fn connect(&mut self) -> Result<(), BrokerError> {
        let client =
            AlpacaClient::new(&self.key_id, &self.secret_key, &self.trading_url, &self.feed);
        // The clock endpoint is cheap and authenticated.
        client.clock()?;
        self.client = Some(client);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.client = None;
        Ok(())
    }

    fn account(&self) -> Result<Account, BrokerError> {
        let info = self.require_client()?.account()?;
        let cash_cents = parse_cents(&info.cash)?;
        Ok(Account {
            equity_cents: parse_cents(&info.equity)?,
            cash_cents,
            buying_power_cents: if info.buying_power.is_empty() {
                cash_cents
            } else {
                parse_cents(&info.buying_power)?
            },
        })
    }

    fn clock(&self) -> Result<Clock, BrokerError> {
        let c = self.require_client()?.clock()?;
        Ok(Clock {
            timestamp: c.timestamp,
            is_open: c.is_open,
            next_open: c.next_open,
            next_close: c.next_close,
        })
    }

    fn positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        let raw = self.require_client()?.positions()?;
        raw.iter()
            .map(|p| {
                let quantity = parse_f64(&p.qty)?;
                let avg_entry_price_cents = parse_cents(&p.avg_entry_price)?;
                let market_value_cents = match p.market_value.as_deref() {
                    Some(v) => parse_cents(v)?,
                    None => (quantity * avg_entry_price_cents as f64).round() as i64,
                };
                Ok(PositionSnapshot {
                    symbol: symbol(&p.symbol)?,
                    quantity,
                    market_value_cents,
                    avg_entry_price_cents,
                    unrealized_pl_cents: p
                        .unrealized_pl
                        .as_deref()
                        .map(parse_cents)
                        .transpose()?
                        .unwrap_or(0),
                })
            })
            .collect()
    }

    fn daily_bars(&self, symbols: &[Symbol], days: usize) -> Result<Vec<Bar>, BrokerError> {
        let client = self.require_client()?;
        let end = Utc::now();
        // Calendar days to cover `days` sessions.
        let start = end - Duration::days((days as i64 * 3) / 2 + 5);
        let start = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end = end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut per_symbol: FxHashMap<Symbol, Vec<Bar>> = FxHashMap::default();
        for batch in symbols.chunks(SYMBOL_BATCH) {
            let joined = join(batch);
            let mut token: Option<String> = None;
            loop {
                let page = client.daily_bars_page(&joined, &start, &end, token.as_deref())?;
                for (sym, entries) in page.bars.unwrap_or_default() {
                    let Some(sym) = Symbol::try_new(&sym) else {
                        warn!("Skipping bars for unsupported symbol {sym}");
                        continue;
                    };
                    per_symbol
                        .entry(sym)
                        .or_default()
                        .extend(entries.iter().map(|e| to_bar(sym, e)));
                }
                match page.next_page_token {
                    Some(t) if !t.is_empty() => token = Some(t),
                    _ => break,
                }
            }
        }

        let mut out = Vec::new();
        for sym in symbols {
            if let Some(mut bars) = per_symbol.remove(sym) {
                bars.sort_by_key(|b| b.timestamp);
                let skip = bars.len().saturating_sub(days);
                out.extend(bars.into_iter().skip(skip));
            }
        }
        debug!("Fetched {} daily bars for {} symbols", out.len(), symbols.len());
        Ok(out)
    }

    fn latest_prices(&self, symbols: &[Symbol]) -> Result<FxHashMap<Symbol, i64>, BrokerError> {
        let client = self.require_client()?;
        let mut out = FxHashMap::default();
        for batch in symbols.chunks(SYMBOL_BATCH) {
            let resp = client.latest_bars(&join(batch))?;
            for (sym, bar) in resp.bars {
                if let Some(sym) = Symbol::try_new(&sym) {
                    out.insert(sym, to_cents(bar.c));
                }
            }
        }
        Ok(out)
    }

    fn fractionable(&self, symbols: &[Symbol]) -> Result<FxHashSet<Symbol>, BrokerError> {
        let wanted: FxHashSet<Symbol> = symbols.iter().copied().collect();
        let assets = self.require_client()?.assets()?;
        Ok(assets
            .iter()
            .filter(|a| a.fractionable && a.tradable)
            .filter_map(|a| Symbol::try_new(&a.symbol))
            .filter(|s| wanted.contains(s))
            .collect())
    }

    fn submit_order(&self, order: &OrderIntent) -> Result<OrderAck, BrokerError> {
        let client = self.require_client()?;
        let resp = client.submit_order(&order_request(order))?;
        Ok(OrderAck {
            id: OrderId(resp.id),
            status: OrderState::from_wire(&resp.status),
            submitted_at: resp.submitted_at,
        })
    }

    fn cancel_all_open_orders(&self) -> Result<usize, BrokerError> {
        let client = self.require_client()?;
        let open = client.open_orders()?;
        let mut cancelled = 0;
        for o in &open {
            match client.cancel_order(&o.id) {
                Ok(()) => cancelled += 1,
                Err(e) => warn!("Cancel failed for {} ({}): {e}", o.id, o.symbol),
            }
        }
        Ok(cancelled)
    }

    fn order_status(&self, id: &OrderId) -> Result<BrokerOrderStatus, BrokerError> {
        let resp = self.require_client()?.order(&id.0)?;
        order_status_from(&resp)
    }
}
