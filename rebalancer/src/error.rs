//! Error types for the rebalancer.

use std::path::PathBuf;

use alphabook_broker::BrokerError;

/// All errors that can occur during a rebalancer run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("engine error: {0}")]
    Engine(#[from] alphabook::Error),

    #[error("proposal source error: {0}")]
    Proposal(String),

    #[error("earnings calendar error: {0}")]
    Earnings(String),

    #[error("risk check failed: {0}")]
    RiskFailed(String),

    #[error("store error at {path}: {source}")]
    Store {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
