//! TOML configuration loading and validation.
//!
//! A `Config` is an immutable snapshot. The cycle loads a fresh one at the
//! start of every run and the scheduler re-reads the file on every tick, so
//! edits take effect at the next cycle boundary.

use std::path::{Path, PathBuf};

use alphabook::proposal::ProposalConstraints;
use alphabook::{DiffConfig, RegimeConfig, Symbol, TurnoverBase, Weighting, to_cents};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::schedule::Schedule;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub broker: BrokerConfig,
    pub strategy: StrategyConfig,
    pub proposal: ProposalConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub earnings: EarningsConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Environment variable holding the API key id.
    #[serde(default = "default_key_env")]
    pub key_id_env: String,
    /// Environment variable holding the API secret.
    #[serde(default = "default_secret_env")]
    pub secret_key_env: String,
    #[serde(default = "default_true")]
    pub paper: bool,
    #[serde(default = "default_feed")]
    pub feed: String,
    /// Overrides the trading endpoint implied by `paper`.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_key_env() -> String {
    "APCA_API_KEY_ID".into()
}
fn default_secret_env() -> String {
    "APCA_API_SECRET_KEY".into()
}
fn default_feed() -> String {
    "iex".into()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub universe: Vec<Symbol>,
    #[serde(default = "default_benchmark")]
    pub benchmark: Symbol,
    /// Daily bars requested per symbol.
    #[serde(default = "default_lookback")]
    pub lookback_days: usize,
    /// Top-scored rows shown to the proposer.
    #[serde(default = "default_panel_size")]
    pub panel_size: usize,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    #[serde(default = "default_cash_buffer")]
    pub cash_buffer: f64,
    /// Blend ratio on the proposal weights (the rest goes to risk weights).
    #[serde(default = "default_ai_weight")]
    pub ai_weight: f64,
    #[serde(default)]
    pub weighting: Weighting,
    #[serde(default = "default_true")]
    pub regime_filter: bool,
    #[serde(default = "default_risk_off_scalar")]
    pub risk_off_scalar: f64,
    /// Refresh panel closes with intraday prices before diffing.
    #[serde(default = "default_true")]
    pub use_intraday: bool,
}

fn default_benchmark() -> Symbol {
    Symbol::new("SPY")
}
fn default_lookback() -> usize {
    250
}
fn default_panel_size() -> usize {
    50
}
fn default_max_positions() -> usize {
    8
}
fn default_max_weight() -> f64 {
    0.20
}
fn default_cash_buffer() -> f64 {
    0.05
}
fn default_ai_weight() -> f64 {
    0.5
}
fn default_risk_off_scalar() -> f64 {
    0.6
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_turnover_limit")]
    pub turnover_limit: f64,
    #[serde(default)]
    pub turnover_base: TurnoverBase,
    /// Deltas below this many dollars are not traded.
    #[serde(default = "default_min_order")]
    pub min_order_usd: f64,
}

fn default_turnover_limit() -> f64 {
    0.25
}
fn default_min_order() -> f64 {
    5.0
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            turnover_limit: default_turnover_limit(),
            turnover_base: TurnoverBase::default(),
            min_order_usd: default_min_order(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Trading windows as `HH:MM` in America/New_York.
    #[serde(default = "default_windows")]
    pub windows_et: Vec<String>,
    #[serde(default = "default_tolerance")]
    pub window_tolerance_min: u32,
    /// No trading within this many minutes of the close.
    #[serde(default = "default_near_close")]
    pub avoid_near_close_min: i64,
    /// `YYYY-MM-DD` dates (ET) with no trading at all.
    #[serde(default)]
    pub macro_dates: Vec<String>,
}

fn default_windows() -> Vec<String> {
    vec!["11:50".into(), "14:35".into()]
}
fn default_tolerance() -> u32 {
    2
}
fn default_near_close() -> i64 {
    15
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            windows_et: default_windows(),
            window_tolerance_min: default_tolerance(),
            avoid_near_close_min: default_near_close(),
            macro_dates: Vec::new(),
        }
    }
}

/// Where allocation proposals come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalSource {
    /// Read a JSON file written by an external agent.
    File,
    /// Run a command: request JSON on stdin, proposal JSON on stdout.
    Command,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalConfig {
    pub source: ProposalSource,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub command: Vec<String>,
    /// Episodes summarized into the memory context.
    #[serde(default = "default_memory_episodes")]
    pub memory_episodes: usize,
}

fn default_memory_episodes() -> usize {
    5
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EarningsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// JSON map of symbol to next earnings date.
    #[serde(default)]
    pub calendar_file: Option<PathBuf>,
    #[serde(default)]
    pub days_before: i64,
    #[serde(default)]
    pub days_after: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_max_orders")]
    pub max_orders_per_run: usize,
    /// Wait before polling submitted orders.
    #[serde(default = "default_reconcile_delay")]
    pub reconcile_delay_secs: u64,
}

fn default_max_orders() -> usize {
    50
}
fn default_reconcile_delay() -> u64 {
    3
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_orders_per_run: default_max_orders(),
            reconcile_delay_secs: default_reconcile_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_runlog_file")]
    pub runlog_file: String,
    #[serde(default = "default_episodes_file")]
    pub episodes_file: String,
    #[serde(default = "default_orders_file")]
    pub orders_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_runlog_file() -> String {
    "runlog.jsonl".into()
}
fn default_episodes_file() -> String {
    "episodes.jsonl".into()
}
fn default_orders_file() -> String {
    "orders.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            runlog_file: default_runlog_file(),
            episodes_file: default_episodes_file(),
            orders_file: default_orders_file(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate config text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if s.universe.is_empty() {
            return Err(Error::Config("strategy.universe must not be empty".into()));
        }
        if s.lookback_days < alphabook::MIN_HISTORY {
            return Err(Error::Config(format!(
                "strategy.lookback_days must be >= {}",
                alphabook::MIN_HISTORY
            )));
        }
        if s.panel_size == 0 {
            return Err(Error::Config("strategy.panel_size must be > 0".into()));
        }
        if s.max_positions == 0 {
            return Err(Error::Config("strategy.max_positions must be > 0".into()));
        }
        if !(s.max_weight > 0.0 && s.max_weight <= 1.0) {
            return Err(Error::Config("strategy.max_weight must be in (0.0, 1.0]".into()));
        }
        if !(0.0..1.0).contains(&s.cash_buffer) {
            return Err(Error::Config("strategy.cash_buffer must be in [0.0, 1.0)".into()));
        }
        if !(0.0..=1.0).contains(&s.ai_weight) {
            return Err(Error::Config("strategy.ai_weight must be in [0.0, 1.0]".into()));
        }
        if !(s.risk_off_scalar > 0.0 && s.risk_off_scalar <= 1.0) {
            return Err(Error::Config(
                "strategy.risk_off_scalar must be in (0.0, 1.0]".into(),
            ));
        }

        if !(self.risk.turnover_limit > 0.0) {
            return Err(Error::Config("risk.turnover_limit must be > 0".into()));
        }
        if !(self.risk.min_order_usd >= 0.0) {
            return Err(Error::Config("risk.min_order_usd must be >= 0".into()));
        }

        if self.schedule.avoid_near_close_min < 0 {
            return Err(Error::Config(
                "schedule.avoid_near_close_min must be >= 0".into(),
            ));
        }
        // Windows and macro dates.
        self.schedule()?;

        match self.proposal.source {
            ProposalSource::File if self.proposal.path.is_none() => {
                return Err(Error::Config(
                    "proposal.path is required when source = \"file\"".into(),
                ));
            }
            ProposalSource::Command if self.proposal.command.is_empty() => {
                return Err(Error::Config(
                    "proposal.command is required when source = \"command\"".into(),
                ));
            }
            _ => {}
        }

        if self.earnings.enabled && self.earnings.calendar_file.is_none() {
            return Err(Error::Config(
                "earnings.calendar_file is required when earnings.enabled = true".into(),
            ));
        }
        if self.earnings.days_before < 0 || self.earnings.days_after < 0 {
            return Err(Error::Config("earnings day offsets must be >= 0".into()));
        }

        if self.execution.max_orders_per_run == 0 {
            return Err(Error::Config(
                "execution.max_orders_per_run must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Parsed schedule (windows, tolerance, macro dates).
    pub fn schedule(&self) -> Result<Schedule> {
        Schedule::from_config(&self.schedule)
    }

    /// Symbols to score: the universe plus the benchmark.
    pub fn scoring_symbols(&self) -> Vec<Symbol> {
        let mut symbols = self.strategy.universe.clone();
        if !symbols.contains(&self.strategy.benchmark) {
            symbols.push(self.strategy.benchmark);
        }
        symbols
    }

    pub fn constraints(&self) -> ProposalConstraints {
        ProposalConstraints {
            max_positions: self.strategy.max_positions,
            max_weight: self.strategy.max_weight,
        }
    }

    pub fn regime_config(&self) -> RegimeConfig {
        RegimeConfig {
            enabled: self.strategy.regime_filter,
            risk_off_scalar: self.strategy.risk_off_scalar,
            benchmark: self.strategy.benchmark,
        }
    }

    pub fn diff_config(&self) -> DiffConfig {
        DiffConfig {
            dust_cents: to_cents(self.risk.min_order_usd),
            turnover_limit: self.risk.turnover_limit,
            turnover_base: self.risk.turnover_base,
        }
    }

    /// Full path to the JSONL run log.
    pub fn runlog_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.runlog_file)
    }

    pub fn episodes_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.episodes_file)
    }

    pub fn orders_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.orders_file)
    }
}
