//! Order side: Buy or Sell

use std::fmt;

use serde::{Deserialize, Serialize};

/// Side of a rebalancing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Side needed to move a holding by `delta` (positive = add exposure).
    #[inline]
    pub fn for_delta(delta: i64) -> Self {
        if delta > 0 { Side::Buy } else { Side::Sell }
    }

    /// Lowercase wire name (`"buy"` / `"sell"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}
