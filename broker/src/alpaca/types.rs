//! Alpaca-specific API request and response types.
//!
//! Alpaca encodes money and quantities as decimal strings; conversion to
//! cents happens in [`super::AlpacaBroker`].

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// GET /v2/account
#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub equity: String,
    pub cash: String,
    #[serde(default)]
    pub buying_power: String,
    #[serde(default)]
    pub status: String,
}

/// GET /v2/clock
#[derive(Debug, Deserialize)]
pub struct ClockResponse {
    pub timestamp: DateTime<Utc>,
    pub is_open: bool,
    pub next_open: Option<DateTime<Utc>>,
    pub next_close: Option<DateTime<Utc>>,
}

/// GET /v2/positions (one element)
#[derive(Debug, Deserialize)]
pub struct PositionResponse {
    pub symbol: String,
    pub qty: String,
    pub market_value: Option<String>,
    pub avg_entry_price: String,
    #[serde(default)]
    pub unrealized_pl: Option<String>,
}

/// GET /v2/assets (one element)
#[derive(Debug, Deserialize)]
pub struct AssetResponse {
    pub symbol: String,
    #[serde(default)]
    pub fractionable: bool,
    #[serde(default)]
    pub tradable: bool,
}

/// POST /v2/orders body. Exactly one of `notional` / `qty` is set.
#[derive(Debug, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notional: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<String>,
    pub side: &'static str,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub time_in_force: &'static str,
}

/// Order object returned by POST /v2/orders and GET /v2/orders/{id}.
#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub symbol: String,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub filled_qty: Option<String>,
    #[serde(default)]
    pub filled_avg_price: Option<String>,
    #[serde(default)]
    pub filled_at: Option<DateTime<Utc>>,
}

/// One bar in a market-data response.
#[derive(Debug, Clone, Deserialize)]
pub struct BarEntry {
    pub t: DateTime<Utc>,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    #[serde(default)]
    pub v: f64,
}

/// GET /v2/stocks/bars (multi-symbol, paginated)
#[derive(Debug, Deserialize)]
pub struct BarsResponse {
    #[serde(default)]
    pub bars: Option<FxHashMap<String, Vec<BarEntry>>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// GET /v2/stocks/bars/latest
#[derive(Debug, Deserialize)]
pub struct LatestBarsResponse {
    #[serde(default)]
    pub bars: FxHashMap<String, BarEntry>,
}

/// Error body Alpaca returns with non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<u64>,
    pub message: String,
}
