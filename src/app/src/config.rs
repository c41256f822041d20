use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use xa_arb_finder::FeeSchedule;
use xa_engine::EngineConfig;
use xa_subscriber::{FeedSource, Market};
use xa_types::{Exchange, FeeRate, Price};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: FeedSource,
    pub market: Market,
    pub binance_fee: FeeRate,
    pub kraken_fee: FeeRate,
    pub min_profit: Price,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub log_level: Level,
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        AppConfig::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<AppConfig, ConfigError> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let defaults = Market::default();

        Ok(AppConfig {
            source: match get("XA_MODE") {
                None => FeedSource::Live,
                Some(v) if v.eq_ignore_ascii_case("live") => FeedSource::Live,
                Some(v) if v.eq_ignore_ascii_case("mock") => FeedSource::Mock,
                Some(v) => return Err(invalid("XA_MODE", v, "expected 'live' or 'mock'")),
            },
            market: Market {
                symbol: get("XA_SYMBOL").map_or(defaults.symbol, str::to_string),
                binance_symbol: get("XA_BINANCE_SYMBOL")
                    .map_or(defaults.binance_symbol, str::to_string),
                kraken_symbol: get("XA_KRAKEN_SYMBOL")
                    .map_or(defaults.kraken_symbol, str::to_string),
            },
            binance_fee: fee(get("XA_BINANCE_FEE"), "XA_BINANCE_FEE", "0.001")?,
            kraken_fee: fee(get("XA_KRAKEN_FEE"), "XA_KRAKEN_FEE", "0.002")?,
            min_profit: min_profit(get("XA_MIN_PROFIT"))?,
            heartbeat_interval: seconds(get("XA_HEARTBEAT_SECS"), "XA_HEARTBEAT_SECS", 60)?,
            reconnect_delay: seconds(get("XA_RECONNECT_SECS"), "XA_RECONNECT_SECS", 5)?,
            log_level: match get("LOG_LEVEL") {
                None => Level::INFO,
                Some(v) => Level::from_str(v).map_err(|e| invalid("LOG_LEVEL", v, e))?,
            },
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fees: FeeSchedule::new()
                .with_fee(Exchange::Binance, self.binance_fee)
                .with_fee(Exchange::Kraken, self.kraken_fee),
            min_profit: self.min_profit,
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn fee(value: Option<&str>, key: &'static str, default: &str) -> Result<FeeRate, ConfigError> {
    let value = value.unwrap_or(default);
    let decimal = Decimal::from_str(value).map_err(|e| invalid(key, value, e))?;
    FeeRate::from_decimal(decimal).map_err(|e| invalid(key, value, e))
}

// Minimum profit is configured in price units (10^-8), not whole currency
fn min_profit(value: Option<&str>) -> Result<Price, ConfigError> {
    match value {
        None => Ok(xa_engine::DEFAULT_MIN_PROFIT),
        Some(v) => i64::from_str(v)
            .map(Price::from_units)
            .map_err(|e| invalid("XA_MIN_PROFIT", v, e)),
    }
}

fn seconds(value: Option<&str>, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs = match value {
        None => default,
        Some(v) => u64::from_str(v).map_err(|e| invalid(key, v, e))?,
    };
    if secs == 0 {
        return Err(invalid(key, "0", "must be at least 1"));
    }
    Ok(Duration::from_secs(secs))
}
