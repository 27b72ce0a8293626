//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Exchange credentials are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::execution::live::DEFAULT_MAX_SPREAD_TICKS;
use crate::execution::throttle::DEFAULT_CALLS_PER_MINUTE;
use crate::rating::TrueSkillConfig;
use crate::storage::RaceFilter;
use crate::strategy::StrategyParams;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub rating: TrueSkillConfig,
    #[serde(default)]
    pub strategy: StrategyParams,
    pub data: DataConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Replay stored races against stored quotes.
    Backtest,
    /// Live prices, simulated fills.
    Paper,
    /// Real orders on the exchange.
    Live,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub checkpoint_path: String,
    pub ledger_path: String,
    #[serde(default = "default_scorecard_path")]
    pub scorecard_path: String,
    /// Seconds between discovery passes in paper/live mode.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// e.g. `sqlite://races.db`
    pub database_url: String,
    #[serde(default)]
    pub filter: RaceFilter,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub app_key_env: String,
    pub username_env: String,
    pub password_env: String,
    pub calls_per_minute: u32,
    /// How far ahead to look for races to trade.
    pub lookahead_hours: i64,
    pub countries: Vec<String>,
    /// Live orders are refused on runners with a wider back/lay book.
    pub max_spread_ticks: i64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_key_env: "BETFAIR_APP_KEY".into(),
            username_env: "BETFAIR_USERNAME".into(),
            password_env: "BETFAIR_PASSWORD".into(),
            calls_per_minute: DEFAULT_CALLS_PER_MINUTE,
            lookahead_hours: 2,
            countries: vec!["GB".into(), "IE".into()],
            max_spread_ticks: DEFAULT_MAX_SPREAD_TICKS,
        }
    }
}

fn default_scorecard_path() -> String {
    "paddock_scorecard.json".into()
}

fn default_poll_interval() -> u64 {
    300
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject numeric settings the strategy could not run with.
    pub fn validate(&self) -> Result<()> {
        self.rating.validate().context("[rating]")?;
        self.strategy.validate().context("[strategy]")?;
        if self.gateway.calls_per_minute == 0 {
            anyhow::bail!("[gateway] calls_per_minute must be at least 1");
        }
        if self.gateway.lookahead_hours <= 0 {
            anyhow::bail!("[gateway] lookahead_hours must be positive");
        }
        if self.gateway.max_spread_ticks < 1 {
            anyhow::bail!("[gateway] max_spread_ticks must be at least 1");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
