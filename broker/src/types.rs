//! Shared broker types: accounts, market clock, order acknowledgements.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account summary from the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub equity_cents: i64,
    pub cash_cents: i64,
    pub buying_power_cents: i64,
}

/// Market clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    pub timestamp: DateTime<Utc>,
    pub is_open: bool,
    pub next_open: Option<DateTime<Utc>>,
    pub next_close: Option<DateTime<Utc>>,
}

impl Clock {
    /// Whole minutes until the next close, if one is scheduled.
    pub fn minutes_to_close(&self) -> Option<i64> {
        self.next_close
            .map(|close| (close - self.timestamp).num_minutes())
    }

    /// True when the market is open and more than `buffer_min` minutes
    /// remain before the close.
    pub fn is_tradable(&self, buffer_min: i64) -> bool {
        if !self.is_open {
            return false;
        }
        match self.next_close {
            Some(close) if buffer_min > 0 => (close - self.timestamp).num_seconds() > buffer_min * 60,
            _ => true,
        }
    }
}

/// Opaque order ID returned by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Accepted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
    Rejected,
}

impl OrderState {
    /// Map a broker status string (`"new"`, `"partially_filled"`, ...).
    pub fn from_wire(s: &str) -> Self {
        match s {
            "filled" => OrderState::Filled,
            "partially_filled" => OrderState::PartiallyFilled,
            "canceled" | "cancelled" | "done_for_day" | "replaced" => OrderState::Cancelled,
            "expired" => OrderState::Expired,
            "rejected" | "suspended" | "stopped" => OrderState::Rejected,
            "new" | "accepted" | "accepted_for_bidding" | "calculated" => OrderState::Accepted,
            _ => OrderState::Pending,
        }
    }

    /// True when the order will not change any more.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Expired | OrderState::Rejected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderState::Pending => "pending",
            OrderState::Accepted => "accepted",
            OrderState::PartiallyFilled => "partially_filled",
            OrderState::Filled => "filled",
            OrderState::Cancelled => "cancelled",
            OrderState::Expired => "expired",
            OrderState::Rejected => "rejected",
        }
    }
}

/// Acknowledgement of an order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub id: OrderId,
    pub status: OrderState,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Status of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrderStatus {
    pub id: OrderId,
    pub status: OrderState,
    pub filled_quantity: f64,
    pub filled_avg_price_cents: Option<i64>,
    pub filled_at: Option<DateTime<Utc>>,
}
