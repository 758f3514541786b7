// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! # alphabook
//!
//! Decision engine for a long-only equity/ETF rebalancer.
//!
//! Every piece here is a pure function of its inputs; brokerage access,
//! scheduling and persistence live in the `alphabook-broker` and
//! `alphabook-rebalancer` crates.
//!
//! ## Pipeline
//!
//! | Stage | Function |
//! |-------|----------|
//! | Feature scoring | [`score_features`] |
//! | Regime detection | [`detect_regime`] |
//! | Proposal ingestion | [`ingest_proposal`] |
//! | Risk allocation | [`risk_weights`] / [`water_fill`] |
//! | Blending | [`blend_weights`] / [`final_weights`] |
//! | Targets | [`investable_capital`] / [`target_notionals`] |
//! | Order diff | [`plan_rebalance`] |
//! | Memory | [`summarize`] |
//!
//! ## Money
//!
//! Account values, targets and diff prices are integer cents ([`i64`]).
//! Feature math runs on `f64` closes.
//!
//! ```
//! use alphabook::{blend_weights, water_fill, Symbol, Weights};
//!
//! let capped = water_fill(
//!     &[(Symbol::new("A"), 0.5), (Symbol::new("B"), 0.3), (Symbol::new("C"), 0.3)],
//!     0.4,
//! );
//! assert!(capped.total() <= 1.0 + 1e-9);
//!
//! let blended = blend_weights(&capped, &Weights::new(), 1.0, 0.35);
//! assert!(blended.max_weight() <= 0.35);
//! ```

pub mod allocate;
pub mod bar;
pub mod blend;
pub mod diff;
mod error;
pub mod event;
pub mod features;
pub mod indicators;
pub mod memory;
pub mod order;
pub mod proposal;
pub mod regime;
mod side;
pub mod target;
mod types;
mod weights;

// Re-export public API
pub use allocate::{risk_weights, water_fill};
pub use bar::{Bar, BarHistory};
pub use blend::{blend_weights, final_weights, Weighting};
pub use diff::{
    check_turnover, compute_orders, plan_rebalance, DiffConfig, RebalancePlan, TurnoverBase,
    TurnoverCheck,
};
pub use error::{Error, Result};
pub use event::{EventSink, Level, LogSink, NullSink, RecordingSink};
pub use features::{score_features, top_panel, FeatureRow, PanelRow, MIN_HISTORY};
pub use memory::{summarize, Episode, EquitySample, NO_PRIOR_EPISODES};
pub use order::{OrderIntent, OrderSize, PositionSnapshot};
pub use proposal::{
    ingest_proposal, parse_proposal, Pick, ProposalConstraints, ProposalOutcome, ProposalRequest,
    ProposedAllocation,
};
pub use regime::{detect_regime, Regime, RegimeConfig};
pub use side::Side;
pub use target::{investable_capital, target_notionals};
pub use types::{to_cents, to_dollars, Symbol};
pub use weights::Weights;
