use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::advice::AdviceParser;
use crate::exchange::binance::BINANCE_API_BASE;
use crate::execution::{ExecutionSettings, RetryPolicy};
use crate::news::cryptonews::CRYPTONEWS_API_BASE;
use crate::news::CryptoNewsFeed;
use crate::oracle::openai::OPENAI_API_BASE;

pub const DEFAULT_CONFIG_FILE: &str = "newstrader.toml";
const ENV_PREFIX: &str = "NEWSTRADER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub secret_key: String,
    pub base_url: String,
    pub quote_asset: String,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            base_url: BINANCE_API_BASE.to_string(),
            quote_asset: "USDT".to_string(),
            requests_per_second: 10,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: OPENAI_API_BASE.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub api_key: String,
    pub base_url: String,
    pub items: u32,
    pub feeds: Vec<String>,
    pub initial_lookback_minutes: i64,
    pub timeout_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: CRYPTONEWS_API_BASE.to_string(),
            items: 10,
            feeds: vec!["news".to_string(), "events".to_string()],
            initial_lookback_minutes: 90,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub max_fee: Decimal,
    pub min_notional: Decimal,
    pub buy_percent: Decimal,
    pub sell_percent: Decimal,
    pub default_duration_hours: u32,
    /// Asset bought for `buy all`; must be set explicitly
    pub all_alias_asset: String,
    pub quantity_decimals: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        let execution = ExecutionSettings::default();
        Self {
            max_fee: execution.max_fee,
            min_notional: execution.min_notional,
            buy_percent: execution.buy_percent,
            sell_percent: execution.sell_percent,
            default_duration_hours: 24,
            all_alias_asset: String::new(),
            quantity_decimals: execution.quantity_decimals,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub cycle_interval_secs: u64,
    pub exit_check_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 30 * 60,
            exit_check_interval_secs: 10 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub positions_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            positions_path: PathBuf::from("positions.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "newstrader=info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub oracle: OracleConfig,
    pub news: NewsConfig,
    pub trading: TradingConfig,
    pub retry: RetryConfig,
    pub schedule: ScheduleConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from an optional TOML file, then `NEWSTRADER__SECTION__KEY` env vars
    ///
    /// An explicit `path` must exist; without one `newstrader.toml` is used
    /// when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("news.feeds")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Reject settings the trading loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let mut require = |ok: bool, message: &str| {
            if !ok {
                problems.push(message.to_string());
            }
        };

        require(!self.exchange.api_key.is_empty(), "exchange.api_key is required");
        require(!self.exchange.secret_key.is_empty(), "exchange.secret_key is required");
        require(!self.oracle.api_key.is_empty(), "oracle.api_key is required");
        require(!self.news.api_key.is_empty(), "news.api_key is required");
        require(!self.exchange.quote_asset.is_empty(), "exchange.quote_asset is required");
        require(
            self.exchange.requests_per_second > 0,
            "exchange.requests_per_second must be positive",
        );

        let t = &self.trading;
        require(
            is_fraction(t.buy_percent),
            "trading.buy_percent must be in (0, 1]",
        );
        require(
            is_fraction(t.sell_percent),
            "trading.sell_percent must be in (0, 1]",
        );
        require(
            t.max_fee >= Decimal::ZERO && t.max_fee < Decimal::ONE,
            "trading.max_fee must be in [0, 1)",
        );
        require(
            t.min_notional > Decimal::ZERO,
            "trading.min_notional must be positive",
        );
        require(
            (1..=99).contains(&t.default_duration_hours),
            "trading.default_duration_hours must be between 1 and 99",
        );
        require(
            !t.all_alias_asset.is_empty()
                && t
                    .all_alias_asset
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
            "trading.all_alias_asset must be an uppercase ticker",
        );
        require(
            t.quantity_decimals <= 18,
            "trading.quantity_decimals must be at most 18",
        );

        require(self.retry.max_attempts > 0, "retry.max_attempts must be positive");
        require(
            self.schedule.cycle_interval_secs > 0,
            "schedule.cycle_interval_secs must be positive",
        );
        require(
            self.schedule.exit_check_interval_secs > 0,
            "schedule.exit_check_interval_secs must be positive",
        );
        require(self.news.items > 0, "news.items must be positive");
        require(!self.news.feeds.is_empty(), "news.feeds must not be empty");
        require(
            self.news.initial_lookback_minutes >= 0,
            "news.initial_lookback_minutes must not be negative",
        );

        if let Err(e) = self.feeds() {
            problems.push(e.to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn feeds(&self) -> Result<Vec<CryptoNewsFeed>, crate::news::NewsError> {
        self.news.feeds.iter().map(|f| f.parse()).collect()
    }

    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            max_fee: self.trading.max_fee,
            min_notional: self.trading.min_notional,
            buy_percent: self.trading.buy_percent,
            sell_percent: self.trading.sell_percent,
            quote_asset: self.exchange.quote_asset.clone(),
            quantity_decimals: self.trading.quantity_decimals,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.delay_secs),
        )
    }

    pub fn advice_parser(&self) -> AdviceParser {
        AdviceParser::new(
            self.trading.default_duration_hours,
            self.trading.all_alias_asset.clone(),
        )
    }
}

fn is_fraction(value: Decimal) -> bool {
    value > Decimal::ZERO && value <= Decimal::ONE
}
