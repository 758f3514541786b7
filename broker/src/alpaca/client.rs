//! Alpaca REST API client (trading + market data).

use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use super::types::{
    AccountResponse, ApiError, AssetResponse, BarsResponse, ClockResponse, LatestBarsResponse,
    OrderRequest, OrderResponse, PositionResponse,
};
use crate::error::BrokerError;

pub const PAPER_URL: &str = "https://paper-api.alpaca.markets";
pub const LIVE_URL: &str = "https://api.alpaca.markets";
pub const DATA_URL: &str = "https://data.alpaca.markets";

/// Blocking Alpaca REST client.
pub struct AlpacaClient {
    client: Client,
    key_id: String,
    secret_key: Zeroizing<String>,
    trading_url: String,
    data_url: String,
    feed: String,
}

impl AlpacaClient {
    /// Create a new client. `feed` is the market-data feed (`iex` or `sip`).
    pub fn new(key_id: &str, secret_key: &str, trading_url: &str, feed: &str) -> Self {
        Self {
            client: Client::new(),
            key_id: key_id.to_string(),
            secret_key: Zeroizing::new(secret_key.to_string()),
            trading_url: trading_url.trim_end_matches('/').to_string(),
            data_url: DATA_URL.to_string(),
            feed: feed.to_string(),
        }
    }

    /// Override the market-data base URL.
    pub fn with_data_url(mut self, url: &str) -> Self {
        self.data_url = url.trim_end_matches('/').to_string();
        self
    }

    fn auth(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", self.secret_key.as_str())
    }

    fn send<T: DeserializeOwned>(&self, what: &str, req: RequestBuilder) -> Result<T, BrokerError> {
        let resp = self
            .auth(req)
            .send()
            .map_err(|e| BrokerError::Connection(format!("{what} request failed: {e}")))?;
        let resp = check_status(what, resp)?;
        resp.json::<T>()
            .map_err(|e| BrokerError::Parse(format!("failed to parse {what}: {e}")))
    }

    /// GET /v2/account
    pub fn account(&self) -> Result<AccountResponse, BrokerError> {
        let url = format!("{}/v2/account", self.trading_url);
        self.send("account", self.client.get(&url))
    }

    /// GET /v2/clock
    pub fn clock(&self) -> Result<ClockResponse, BrokerError> {
        let url = format!("{}/v2/clock", self.trading_url);
        self.send("clock", self.client.get(&url))
    }

    /// GET /v2/positions
    pub fn positions(&self) -> Result<Vec<PositionResponse>, BrokerError> {
        let url = format!("{}/v2/positions", self.trading_url);
        self.send("positions", self.client.get(&url))
    }

    /// GET /v2/assets for active US equities.
    pub fn assets(&self) -> Result<Vec<AssetResponse>, BrokerError> {
        let url = format!("{}/v2/assets", self.trading_url);
        let req = self
            .client
            .get(&url)
            .query(&[("status", "active"), ("asset_class", "us_equity")]);
        self.send("assets", req)
    }

    /// POST /v2/orders
    pub fn submit_order(&self, order: &OrderRequest) -> Result<OrderResponse, BrokerError> {
        let url = format!("{}/v2/orders", self.trading_url);
        debug!("Submitting Alpaca order: {order:?}");

        let resp = self
            .auth(self.client.post(&url).json(order))
            .send()
            .map_err(|e| BrokerError::Order(format!("order request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(BrokerError::Order(format!(
                "order returned {status}: {}",
                api_message(body)
            )));
        }
        resp.json::<OrderResponse>()
            .map_err(|e| BrokerError::Parse(format!("failed to parse order response: {e}")))
    }

    /// GET /v2/orders?status=open
    pub fn open_orders(&self) -> Result<Vec<OrderResponse>, BrokerError> {
        let url = format!("{}/v2/orders", self.trading_url);
        let req = self
            .client
            .get(&url)
            .query(&[("status", "open"), ("limit", "500")]);
        self.send("open orders", req)
    }

    /// GET /v2/orders/{id}
    pub fn order(&self, id: &str) -> Result<OrderResponse, BrokerError> {
        let url = format!("{}/v2/orders/{id}", self.trading_url);
        self.send("order status", self.client.get(&url))
    }

    /// DELETE /v2/orders/{id}
    pub fn cancel_order(&self, id: &str) -> Result<(), BrokerError> {
        let url = format!("{}/v2/orders/{id}", self.trading_url);
        let resp = self
            .auth(self.client.delete(&url))
            .send()
            .map_err(|e| BrokerError::Order(format!("cancel request failed: {e}")))?;
        check_status("cancel", resp)?;
        Ok(())
    }

    /// GET /v2/stocks/bars, one page.
    pub fn daily_bars_page(
        &self,
        symbols: &str,
        start: &str,
        end: &str,
        page_token: Option<&str>,
    ) -> Result<BarsResponse, BrokerError> {
        let url = format!("{}/v2/stocks/bars", self.data_url);
        let mut query = vec![
            ("symbols", symbols.to_string()),
            ("timeframe", "1Day".to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
            ("limit", "10000".to_string()),
            ("adjustment", "raw".to_string()),
            ("feed", self.feed.clone()),
        ];
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }
        self.send("bars", self.client.get(&url).query(&query))
    }

    /// GET /v2/stocks/bars/latest
    pub fn latest_bars(&self, symbols: &str) -> Result<LatestBarsResponse, BrokerError> {
        let url = format!("{}/v2/stocks/bars/latest", self.data_url);
        let req = self
            .client
            .get(&url)
            .query(&[("symbols", symbols), ("feed", self.feed.as_str())]);
        self.send("latest bars", req)
    }
}

/// Map non-2xx responses to errors, keeping Alpaca's message when present.
fn check_status(what: &str, resp: Response) -> Result<Response, BrokerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = api_message(resp.text().unwrap_or_default());

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BrokerError::Auth(format!("{what} returned {status}: {message}"))
        }
        StatusCode::TOO_MANY_REQUESTS => BrokerError::RateLimit,
        _ => BrokerError::Connection(format!("{what} returned {status}: {message}")),
    })
}

/// Alpaca's `message` field if the body is an API error, else the raw body.
fn api_message(body: String) -> String {
    serde_json::from_str::<ApiError>(&body)
        .map(|e| e.message)
        .unwrap_or(body)
}
