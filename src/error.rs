//! Errors raised by the decision engine.

use chrono::{DateTime, Utc};

use crate::Symbol;

/// Errors returned by fallible engine operations.
///
/// Most of the engine is total (pure functions over validated inputs); the
/// only failures are malformed bar histories and proposal validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Two bars for the same symbol share a timestamp.
    #[error("duplicate bar for {symbol} at {timestamp}")]
    DuplicateBar {
        symbol: Symbol,
        timestamp: DateTime<Utc>,
    },

    /// A bar was appended that is not strictly after the previous one.
    #[error("bar for {symbol} at {timestamp} is not after the previous bar at {previous}")]
    OutOfOrderBar {
        symbol: Symbol,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },

    /// The external allocation proposal failed validation.
    #[error("invalid proposal: {0}")]
    Proposal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
