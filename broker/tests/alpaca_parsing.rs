// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! Alpaca request building and response parsing, without a live connection.

#[cfg(feature = "alpaca")]
mod alpaca_tests {
    use alphabook::{OrderIntent, Side, Symbol};
    use alphabook_broker::alpaca::types::{
        AccountResponse, BarsResponse, ClockResponse, LatestBarsResponse, OrderResponse,
        PositionResponse,
    };
    use alphabook_broker::alpaca::{order_request, order_status_from, parse_cents};
    use alphabook_broker::{BrokerError, OrderState};

    // ========================================================================
    // Decimal strings
    // ========================================================================

    #[test]
    fn parse_cents_rounds() {
        assert_eq!(parse_cents("185.50").unwrap(), 185_50);
        assert_eq!(parse_cents("100000").unwrap(), 100_000_00);
        assert_eq!(parse_cents("-12.345").unwrap(), -12_35);
        assert_eq!(parse_cents(" 1.25 ").unwrap(), 1_25);
    }

    #[test]
    fn parse_cents_rejects_garbage() {
        assert!(matches!(parse_cents("abc"), Err(BrokerError::Parse(_))));
    }

    // ========================================================================
    // Trading API
    // ========================================================================

    #[test]
    fn parse_account() {
        let json = r#"{
            "id": "904837e3-3b76-47ec-b432-046db621571b",
            "status": "ACTIVE",
            "currency": "USD",
            "cash": "4000.32",
            "equity": "103820.56",
            "buying_power": "8000.64",
            "pattern_day_trader": false
        }"#;
        let a: AccountResponse = serde_json::from_str(json).unwrap();
        assert_eq!(a.equity, "103820.56");
        assert_eq!(a.cash, "4000.32");
        assert_eq!(a.status, "ACTIVE");
    }

    #[test]
    fn parse_clock_with_offsets() {
        let json = r#"{
            "timestamp": "2026-03-04T12:00:00.123-05:00",
            "is_open": true,
            "next_open": "2026-03-05T09:30:00-05:00",
            "next_close": "2026-03-04T16:00:00-05:00"
        }"#;
        let c: ClockResponse = serde_json::from_str(json).unwrap();
        assert!(c.is_open);
        let close = c.next_close.unwrap();
        assert_eq!(close.to_rfc3339(), "2026-03-04T21:00:00+00:00");
        assert_eq!((close - c.timestamp).num_minutes(), 239);
    }

    #[test]
    fn parse_positions() {
        let json = r#"[{
            "asset_id": "b0b6dd9d-8b9b-48a9-ba46-b9d54906e415",
            "symbol": "AAPL",
            "qty": "1.5",
            "avg_entry_price": "150.00",
            "market_value": "270.75",
            "unrealized_pl": "45.75",
            "side": "long"
        }]"#;
        let p: Vec<PositionResponse> = serde_json::from_str(json).unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p[0].qty, "1.5");
        assert_eq!(p[0].market_value.as_deref(), Some("270.75"));
    }

    #[test]
    fn notional_order_body() {
        let order = OrderIntent::notional(Symbol::new("SPY"), Side::Buy, 1_234_56);
        let body = serde_json::to_value(order_request(&order)).unwrap();
        assert_eq!(body["symbol"], "SPY");
        assert_eq!(body["notional"], "1234.56");
        assert!(body.get("qty").is_none());
        assert_eq!(body["side"], "buy");
        assert_eq!(body["type"], "market");
        assert_eq!(body["time_in_force"], "day");
    }

    #[test]
    fn share_order_body() {
        let order = OrderIntent::shares(Symbol::new("BRK.B"), Side::Sell, 7);
        let body = serde_json::to_value(order_request(&order)).unwrap();
        assert_eq!(body["qty"], "7");
        assert!(body.get("notional").is_none());
        assert_eq!(body["side"], "sell");
    }

    #[test]
    fn parse_order_and_status() {
        let json = r#"{
            "id": "61e69015-8549-4bfd-b9c3-01e75843f47d",
            "client_order_id": "eb9e2aaa-f71a-4f51-b5b4-52a6c565dad4",
            "symbol": "AAPL",
            "status": "partially_filled",
            "submitted_at": "2026-03-04T15:00:00Z",
            "filled_qty": "0.5",
            "filled_avg_price": "181.235",
            "filled_at": null
        }"#;
        let o: OrderResponse = serde_json::from_str(json).unwrap();
        let status = order_status_from(&o).unwrap();
        assert_eq!(status.status, OrderState::PartiallyFilled);
        assert_eq!(status.filled_quantity, 0.5);
        assert_eq!(status.filled_avg_price_cents, Some(181_24));
        assert!(status.filled_at.is_none());
    }

    #[test]
    fn parse_new_order_without_fills() {
        let json = r#"{"id":"x","symbol":"SPY","status":"accepted","submitted_at":null,
                       "filled_qty":"0","filled_avg_price":null}"#;
        let o: OrderResponse = serde_json::from_str(json).unwrap();
        let status = order_status_from(&o).unwrap();
        assert_eq!(status.status, OrderState::Accepted);
        assert_eq!(status.filled_avg_price_cents, None);
    }

    // ========================================================================
    // Market data
    // ========================================================================

    #[test]
    fn parse_bars_page() {
        let json = r#"{
            "bars": {
                "SPY": [
                    {"t":"2026-03-02T05:00:00Z","o":580.1,"h":585.0,"l":579.0,"c":584.2,"v":51234567,"n":1,"vw":582.0},
                    {"t":"2026-03-03T05:00:00Z","o":584.2,"h":586.0,"l":581.0,"c":582.9,"v":48234567}
                ]
            },
            "next_page_token": "U1BZfDIwMjY="
        }"#;
        let page: BarsResponse = serde_json::from_str(json).unwrap();
        let bars = page.bars.unwrap();
        assert_eq!(bars["SPY"].len(), 2);
        assert_eq!(bars["SPY"][1].c, 582.9);
        assert_eq!(page.next_page_token.as_deref(), Some("U1BZfDIwMjY="));
    }

    #[test]
    fn parse_empty_bars_page() {
        let page: BarsResponse =
            serde_json::from_str(r#"{"bars": null, "next_page_token": null}"#).unwrap();
        assert!(page.bars.is_none());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn parse_latest_bars() {
        let json = r#"{"bars":{"AAPL":{"t":"2026-03-04T15:59:00Z","o":1,"h":1,"l":1,"c":181.5,"v":100}}}"#;
        let r: LatestBarsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(r.bars["AAPL"].c, 181.5);
    }
}
