//! In-memory broker with scripted account, clock, bars and fills.
//!
//! Use this in integration tests to simulate broker responses without network calls.
//!
//! ```
//! use alphabook::Symbol;
//! use alphabook_broker::mock::{FillMode, MockBroker};
//!
//! let broker = MockBroker::builder()
//!     .fill_mode(FillMode::ImmediateFull)
//!     .with_position(Symbol::new("AAPL"), 100.0, 150_00)
//!     .with_account(1_000_000_00, 500_000_00)
//!     .build();
//! assert!(broker.submitted_orders().is_empty());
//! ```

use std::sync::{Mutex, MutexGuard};

use alphabook::{Bar, OrderIntent, PositionSnapshot, Symbol};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::BrokerError;
use crate::types::*;
use crate::Broker;

/// How the mock broker handles submitted orders.
#[derive(Clone, Debug)]
pub enum FillMode {
    /// Orders are immediately fully filled.
    ImmediateFull,
    /// Orders are partially filled (the given fraction, e.g., 0.5 = 50%).
    ImmediatePartial(f64),
    /// All orders are rejected.
    Reject,
}

/// Broker calls that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockCall {
    Account,
    Clock,
    Positions,
    DailyBars,
    LatestPrices,
    Fractionable,
    CancelAll,
    OrderStatus,
}

/// Builder for `MockBroker`.
pub struct MockBrokerBuilder {
    fill_mode: FillMode,
    account: Account,
    clock: Clock,
    positions: Vec<PositionSnapshot>,
    bars: Vec<Bar>,
    prices: FxHashMap<Symbol, i64>,
    fractionable: FxHashSet<Symbol>,
    all_fractionable: bool,
    rejected_symbols: FxHashSet<Symbol>,
    failing: FxHashSet<MockCall>,
    open_orders: usize,
}

impl MockBrokerBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    /// Add a position valued at `quantity * price_cents`.
    pub fn with_position(mut self, symbol: Symbol, quantity: f64, price_cents: i64) -> Self {
        let market_value = (quantity * price_cents as f64).round() as i64;
        self.positions.push(PositionSnapshot {
            symbol,
            quantity,
            market_value_cents: market_value,
            avg_entry_price_cents: price_cents,
            unrealized_pl_cents: 0,
        });
        self
    }

    pub fn with_account(mut self, equity_cents: i64, cash_cents: i64) -> Self {
        self.account = Account {
            equity_cents,
            cash_cents,
            buying_power_cents: cash_cents,
        };
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Mark the market closed.
    pub fn market_closed(mut self) -> Self {
        self.clock.is_open = false;
        self
    }

    pub fn with_bars(mut self, bars: impl IntoIterator<Item = Bar>) -> Self {
        self.bars.extend(bars);
        self
    }

    /// Add one daily bar per close, ending the day before the clock.
    pub fn with_closes(mut self, symbol: Symbol, closes: &[f64]) -> Self {
        let n = closes.len() as i64;
        let end = self.clock.timestamp;
        self.bars.extend(closes.iter().enumerate().map(|(i, &close)| Bar {
            symbol,
            timestamp: end - Duration::days(n - i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000_000.0,
        }));
        self
    }

    pub fn with_price(mut self, symbol: Symbol, price_cents: i64) -> Self {
        self.prices.insert(symbol, price_cents);
        self
    }

    pub fn with_fractionable(mut self, symbol: Symbol) -> Self {
        self.fractionable.insert(symbol);
        self
    }

    /// Treat every symbol as fractionable.
    pub fn all_fractionable(mut self) -> Self {
        self.all_fractionable = true;
        self
    }

    /// Reject submissions for `symbol` only.
    pub fn reject_symbol(mut self, symbol: Symbol) -> Self {
        self.rejected_symbols.insert(symbol);
        self
    }

    /// Make `call` return a connection error.
    pub fn failing(mut self, call: MockCall) -> Self {
        self.failing.insert(call);
        self
    }

    /// Number of resting orders the broker starts with.
    pub fn with_open_orders(mut self, n: usize) -> Self {
        self.open_orders = n;
        self
    }

    pub fn build(self) -> MockBroker {
        MockBroker {
            connected: false,
            fill_mode: self.fill_mode,
            account: self.account,
            clock: self.clock,
            positions: Mutex::new(self.positions),
            bars: self.bars,
            prices: self.prices,
            fractionable: self.fractionable,
            all_fractionable: self.all_fractionable,
            rejected_symbols: self.rejected_symbols,
            failing: self.failing,
            state: Mutex::new(MockState {
                next_order_id: 1,
                open_orders: self.open_orders,
                submitted: Vec::new(),
                cancel_calls: 0,
            }),
        }
    }
}

struct MockState {
    next_order_id: u64,
    open_orders: usize,
    submitted: Vec<OrderIntent>,
    cancel_calls: usize,
}

/// A mock broker that records submitted orders and returns configurable responses.
pub struct MockBroker {
    connected: bool,
    fill_mode: FillMode,
    account: Account,
    clock: Clock,
    positions: Mutex<Vec<PositionSnapshot>>,
    bars: Vec<Bar>,
    prices: FxHashMap<Symbol, i64>,
    fractionable: FxHashSet<Symbol>,
    all_fractionable: bool,
    rejected_symbols: FxHashSet<Symbol>,
    failing: FxHashSet<MockCall>,
    state: Mutex<MockState>,
}

/// Midday on a Wednesday, three hours before the close.
fn default_clock() -> Clock {
    let now: DateTime<Utc> = Utc
        .with_ymd_and_hms(2026, 3, 4, 17, 0, 0)
        .single()
        .unwrap_or_default();
    Clock {
        timestamp: now,
        is_open: true,
        next_open: Some(now + Duration::hours(21) - Duration::minutes(30)),
        next_close: Some(now + Duration::hours(3)),
    }
}

impl MockBroker {
    pub fn builder() -> MockBrokerBuilder {
        MockBrokerBuilder {
            fill_mode: FillMode::ImmediateFull,
            account: Account {
                equity_cents: 1_000_000_00,
                cash_cents: 1_000_000_00,
                buying_power_cents: 1_000_000_00,
            },
            clock: default_clock(),
            positions: Vec::new(),
            bars: Vec::new(),
            prices: FxHashMap::default(),
            fractionable: FxHashSet::default(),
            all_fractionable: false,
            rejected_symbols: FxHashSet::default(),
            failing: FxHashSet::default(),
            open_orders: 0,
        }
    }

    /// Get all orders that were submitted (for assertion in tests).
    pub fn submitted_orders(&self) -> Vec<OrderIntent> {
        self.state().submitted.clone()
    }

    /// Number of `cancel_all_open_orders` calls.
    pub fn cancel_calls(&self) -> usize {
        self.state().cancel_calls
    }

    /// Replace the position set, e.g. to simulate fills between reads.
    pub fn set_positions(&self, positions: Vec<PositionSnapshot>) {
        *self.positions.lock().unwrap_or_else(|e| e.into_inner()) = positions;
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, call: MockCall) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        if self.failing.contains(&call) {
            return Err(BrokerError::Connection(format!("mock: {call:?} unavailable")));
        }
        Ok(())
    }
}

impl Broker for MockBroker {
    fn connect(&mut self) -> Result<(), BrokerError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        Ok(())
    }

    fn account(&self) -> Result<Account, BrokerError> {
        self.check(MockCall::Account)?;
        Ok(self.account.clone())
    }

    fn clock(&self) -> Result<Clock, BrokerError> {
        self.check(MockCall::Clock)?;
        Ok(self.clock.clone())
    }

    fn positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        self.check(MockCall::Positions)?;
        Ok(self.positions.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn daily_bars(&self, symbols: &[Symbol], days: usize) -> Result<Vec<Bar>, BrokerError> {
        self.check(MockCall::DailyBars)?;
        let mut out = Vec::new();
        for symbol in symbols {
            let series: Vec<&Bar> = self.bars.iter().filter(|b| b.symbol == *symbol).collect();
            let skip = series.len().saturating_sub(days);
            out.extend(series.into_iter().skip(skip).cloned());
        }
        Ok(out)
    }

    fn latest_prices(&self, symbols: &[Symbol]) -> Result<FxHashMap<Symbol, i64>, BrokerError> {
        self.check(MockCall::LatestPrices)?;
        Ok(symbols
            .iter()
            .filter_map(|s| self.prices.get(s).map(|p| (*s, *p)))
            .collect())
    }

    fn fractionable(&self, symbols: &[Symbol]) -> Result<FxHashSet<Symbol>, BrokerError> {
        self.check(MockCall::Fractionable)?;
        Ok(symbols
            .iter()
            .copied()
            .filter(|s| self.all_fractionable || self.fractionable.contains(s))
            .collect())
    }

    fn submit_order(&self, order: &OrderIntent) -> Result<OrderAck, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        let mut state = self.state();
        state.submitted.push(*order);

        if matches!(self.fill_mode, FillMode::Reject) || self.rejected_symbols.contains(&order.symbol)
        {
            return Err(BrokerError::Order(format!("mock: {} rejected", order.symbol)));
        }

        let id = OrderId(format!("mock-{}", state.next_order_id));
        state.next_order_id += 1;
        Ok(OrderAck {
            id,
            status: OrderState::Accepted,
            submitted_at: Some(self.clock.timestamp),
        })
    }

    fn cancel_all_open_orders(&self) -> Result<usize, BrokerError> {
        self.check(MockCall::CancelAll)?;
        let mut state = self.state();
        state.cancel_calls += 1;
        Ok(std::mem::take(&mut state.open_orders))
    }

    fn order_status(&self, id: &OrderId) -> Result<BrokerOrderStatus, BrokerError> {
        self.check(MockCall::OrderStatus)?;

        let (status, filled) = match &self.fill_mode {
            FillMode::ImmediateFull => (OrderState::Filled, 1.0),
            FillMode::ImmediatePartial(frac) => (OrderState::PartiallyFilled, *frac),
            FillMode::Reject => (OrderState::Rejected, 0.0),
        };

        Ok(BrokerOrderStatus {
            id: id.clone(),
            status,
            filled_quantity: filled,
            filled_avg_price_cents: None,
            filled_at: (filled > 0.0).then_some(self.clock.timestamp),
        })
    }
}
