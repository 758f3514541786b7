//! Broker trait and implementations for alphabook.
//!
//! Provides a generic `Broker` trait that abstracts over the brokerage the
//! rebalancer trades through. Implementations:
//!
//! - **Mock** ([`mock::MockBroker`]): in-memory, for tests and dry runs
//! - **Alpaca** (feature `alpaca`): Alpaca trading + market-data REST API

pub mod error;
pub mod mock;
pub mod types;

#[cfg(feature = "alpaca")]
pub mod alpaca;

pub use error::BrokerError;
pub use types::*;

use alphabook::{Bar, OrderIntent, PositionSnapshot, Symbol};
use rustc_hash::{FxHashMap, FxHashSet};

/// A brokerage connection: account state, market data and order routing.
///
/// All reads are snapshots; the broker is the source of truth for positions
/// and open orders.
pub trait Broker {
    /// Connect to the broker.
    fn connect(&mut self) -> Result<(), BrokerError>;

    /// Disconnect gracefully.
    fn disconnect(&mut self) -> Result<(), BrokerError>;

    /// Account summary (equity, cash).
    fn account(&self) -> Result<Account, BrokerError>;

    /// Market clock.
    fn clock(&self) -> Result<Clock, BrokerError>;

    /// All open positions.
    fn positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError>;

    /// Up to `days` daily bars per symbol, oldest first.
    fn daily_bars(&self, symbols: &[Symbol], days: usize) -> Result<Vec<Bar>, BrokerError>;

    /// Most recent intraday trade price per symbol, in cents. Symbols without
    /// a recent print are absent.
    fn latest_prices(&self, symbols: &[Symbol]) -> Result<FxHashMap<Symbol, i64>, BrokerError>;

    /// The subset of `symbols` that accepts fractional / notional orders.
    fn fractionable(&self, symbols: &[Symbol]) -> Result<FxHashSet<Symbol>, BrokerError>;

    /// Submit a day-valid market order.
    fn submit_order(&self, order: &OrderIntent) -> Result<OrderAck, BrokerError>;

    /// Cancel every open order. Individual cancel failures are logged and
    /// skipped. Returns the number of orders cancelled.
    fn cancel_all_open_orders(&self) -> Result<usize, BrokerError>;

    /// Status of a submitted order.
    fn order_status(&self, id: &OrderId) -> Result<BrokerOrderStatus, BrokerError>;
}

impl<B: Broker + ?Sized> Broker for Box<B> {
    fn connect(&mut self) -> Result<(), BrokerError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        (**self).disconnect()
    }

    fn account(&self) -> Result<Account, BrokerError> {
        (**self).account()
    }

    fn clock(&self) -> Result<Clock, BrokerError> {
        (**self).clock()
    }

    fn positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        (**self).positions()
    }

    fn daily_bars(&self, symbols: &[Symbol], days: usize) -> Result<Vec<Bar>, BrokerError> {
        (**self).daily_bars(symbols, days)
    }

    fn latest_prices(&self, symbols: &[Symbol]) -> Result<FxHashMap<Symbol, i64>, BrokerError> {
        (**self).latest_prices(symbols)
    }

    fn fractionable(&self, symbols: &[Symbol]) -> Result<FxHashSet<Symbol>, BrokerError> {
        (**self).fractionable(symbols)
    }

    fn submit_order(&self, order: &OrderIntent) -> Result<OrderAck, BrokerError> {
        (**self).submit_order(order)
    }

    fn cancel_all_open_orders(&self) -> Result<usize, BrokerError> {
        (**self).cancel_all_open_orders()
    }

    fn order_status(&self, id: &OrderId) -> Result<BrokerOrderStatus, BrokerError> {
        (**self).order_status(id)
    }
}
