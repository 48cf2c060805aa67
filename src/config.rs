//! Typed run configuration.
//!
//! Layered from a config file plus `TRENDBOT_*` environment overrides, then
//! validated in one pass. Required risk fields are rejected when missing,
//! never default-substituted. Exchange credentials stay in the environment
//! (`.env`), not in this file.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::risk::RiskConfig;
use crate::strategy::StrategyParams;

pub const DEFAULT_CONFIG_PATH: &str = "config/trading";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Unified symbol, e.g. "BTC/USDT:USDT"
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Simulate order submission instead of trading live
    #[serde(default = "default_paper")]
    pub paper: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,
    /// Margin mode: "cross" or "isolated"
    #[serde(default = "default_td_mode")]
    pub td_mode: String,
    /// Position side tag for hedge-mode accounts ("long"/"short")
    #[serde(default)]
    pub pos_side: Option<String>,
    /// Reduce-only flag for the manual `order` subcommand
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub post_only: bool,
    pub risk: RiskConfig,
    #[serde(default)]
    pub strategy: StrategyParams,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_markets_file")]
    pub markets_file: PathBuf,
}

fn default_timeframe() -> String {
    "5m".to_string()
}
fn default_paper() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    30
}
fn default_candle_limit() -> u32 {
    250
}
fn default_td_mode() -> String {
    "cross".to_string()
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_markets_file() -> PathBuf {
    PathBuf::from("config/markets.json")
}

impl AppConfig {
    /// Load and validate configuration from `path` (default
    /// `config/trading.{toml,yaml,json}`) with `TRENDBOT_*` env overrides,
    /// e.g. `TRENDBOT_RISK__MAX_ORDER_NOTIONAL=50`.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let cfg: AppConfig = Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_CONFIG_PATH)))
            .add_source(Environment::with_prefix("TRENDBOT").separator("__"))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.symbol.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "symbol {:?} is not a unified symbol like BTC/USDT:USDT",
                self.symbol
            )));
        }
        if self.timeframe.is_empty() {
            return Err(ConfigError::Invalid("timeframe must not be empty".into()));
        }
        if self.td_mode != "cross" && self.td_mode != "isolated" {
            return Err(ConfigError::Invalid(format!(
                "td_mode must be \"cross\" or \"isolated\", got {:?}",
                self.td_mode
            )));
        }

        let risk = &self.risk;
        if !(0.0..=1.0).contains(&risk.order_fraction_of_balance) {
            return Err(ConfigError::Invalid(format!(
                "order_fraction_of_balance must be in [0, 1], got {}",
                risk.order_fraction_of_balance
            )));
        }
        for (name, value) in [
            ("max_position_notional", risk.max_position_notional),
            ("max_order_notional", risk.max_order_notional),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        let strategy = &self.strategy;
        if strategy.fast_ema == 0 || strategy.slow_ema == 0 || strategy.rsi_period < 2 {
            return Err(ConfigError::Invalid(
                "indicator periods must be positive (rsi_period at least 2)".into(),
            ));
        }
        if strategy.fast_ema >= strategy.slow_ema {
            return Err(ConfigError::Invalid(format!(
                "fast_ema ({}) must be shorter than slow_ema ({})",
                strategy.fast_ema, strategy.slow_ema
            )));
        }
        for (name, value) in [
            ("rsi_entry", strategy.rsi_entry),
            ("rsi_exit", strategy.rsi_exit),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in [0, 100], got {value}"
                )));
            }
        }

        Ok(())
    }

    /// Settlement/quote currency whose free balance funds entries:
    /// "BTC/USDT:USDT" -> "USDT".
    pub fn quote_ccy(&self) -> &str {
        match self.symbol.split_once(':') {
            Some((_, settle)) if !settle.is_empty() => settle,
            _ => self
                .symbol
                .split_once('/')
                .map(|(_, quote)| quote)
                .unwrap_or("USDT"),
        }
    }
}
