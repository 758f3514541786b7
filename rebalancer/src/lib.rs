//! alphabook-rebalancer: scheduled, AI-assisted portfolio rebalancing on Alpaca.
//!
//! Each cycle scores the universe from daily bars, asks an external proposer
//! for an allocation, blends it with risk-parity weights, diffs against live
//! positions, and submits market orders behind turnover and pre-submit
//! checks. Episodes and orders are appended to JSONL files that feed the
//! proposer's memory on the next run.

pub mod audit;
pub mod broker;
pub mod config;
pub mod cycle;
pub mod earnings;
pub mod error;
pub mod execution;
pub mod proposal;
pub mod reconcile;
pub mod risk;
pub mod schedule;
pub mod store;
