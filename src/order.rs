//! Order intents and the position snapshots they are diffed against.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::to_dollars;
use crate::{Side, Symbol};

/// Current holding in one symbol, as reported by the brokerage.
///
/// Money fields are integer cents. Quantity may be fractional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: Symbol,
    pub quantity: f64,
    pub market_value_cents: i64,
    pub avg_entry_price_cents: i64,
    pub unrealized_pl_cents: i64,
}

/// Size of an order: a dollar notional or a whole number of shares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSize {
    /// Notional amount in cents (fractionable symbols only).
    Notional(i64),
    /// Whole shares.
    Shares(u64),
}

/// A market, day-valid order the engine wants submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub side: Side,
    pub size: OrderSize,
}

impl OrderIntent {
    pub fn notional(symbol: Symbol, side: Side, cents: i64) -> Self {
        Self {
            symbol,
            side,
            size: OrderSize::Notional(cents),
        }
    }

    pub fn shares(symbol: Symbol, side: Side, qty: u64) -> Self {
        Self {
            symbol,
            side,
            size: OrderSize::Shares(qty),
        }
    }

    /// Notional in cents, if this is a notional order.
    pub fn notional_cents(&self) -> Option<i64> {
        match self.size {
            OrderSize::Notional(c) => Some(c),
            OrderSize::Shares(_) => None,
        }
    }

    /// Share quantity, if this is a whole-share order.
    pub fn quantity(&self) -> Option<u64> {
        match self.size {
            OrderSize::Shares(q) => Some(q),
            OrderSize::Notional(_) => None,
        }
    }
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            OrderSize::Notional(c) => {
                write!(f, "{} {} ${:.2}", self.side, self.symbol, to_dollars(c))
            }
            OrderSize::Shares(q) => write!(f, "{} {} {} sh", self.side, self.symbol, q),
        }
    }
}
