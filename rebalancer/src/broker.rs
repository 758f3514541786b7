//! Broker connection from configuration.

use alphabook_broker::Broker;
use alphabook_broker::alpaca::AlpacaBroker;
use log::info;

use crate::config::BrokerConfig;
use crate::error::{Error, Result};

/// API credentials resolved from the environment.
pub struct Credentials {
    pub key_id: String,
    pub secret_key: String,
}

impl Credentials {
    /// Read the variables named in the config. Missing or empty is fatal.
    pub fn from_env(config: &BrokerConfig) -> Result<Self> {
        Ok(Self {
            key_id: read_var(&config.key_id_env)?,
            secret_key: read_var(&config.secret_key_env)?,
        })
    }
}

fn read_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!(
            "missing credentials: environment variable {name} is not set"
        ))),
    }
}

/// Build and connect the configured broker.
pub fn connect(config: &BrokerConfig) -> Result<Box<dyn Broker>> {
    let creds = Credentials::from_env(config)?;
    let mut broker = AlpacaBroker::new(&creds.key_id, &creds.secret_key, config.paper)
        .with_feed(&config.feed);
    if let Some(url) = &config.base_url {
        broker = broker.with_base_url(url);
    }
    broker.connect()?;
    info!(
        "Connected to Alpaca ({}, feed {})",
        if config.paper { "paper" } else { "live" },
        config.feed
    );
    Ok(Box::new(broker))
}
