//! Configuration management
//!
//! Loads the JSON strategy configuration. The configuration is read once at
//! startup and never mutated afterwards; every value is validated before the
//! strategy is built.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::risk::{PositionSizer, VolatilityFallback};
use crate::Symbol;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one symbol is required")]
    NoSymbols,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("{field} must be >= 1, got {value}")]
    ZeroWindow { field: &'static str, value: usize },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must be in (0, 1], got {value}")]
    FractionOutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be >= 0 hours, got {value}")]
    NegativeHours { field: &'static str, value: i64 },

    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub backtest: BacktestConfig,
    pub trading: TradingConfig,
    pub strategy: StrategyConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        Ok(config)
    }

    /// Single-asset preset: BTCUSD, fixed 10% weight, 24h insights
    pub fn single_asset() -> Self {
        Self::default()
    }

    /// Multi-asset preset: ATR sizing, 48h insights
    pub fn multi_asset(symbols: &[&str]) -> Self {
        let mut config = Self::default();
        config.trading.symbols = symbols.iter().map(|s| s.to_string()).collect();
        config.strategy = StrategyConfig {
            name: "donchian_atr_basket".to_string(),
            insight_period_hours: 48,
            sizing: SizingConfig::default_volatility(),
            ..StrategyConfig::default()
        };
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backtest.validate()?;
        self.trading.validate()?;
        self.strategy.validate()
    }
}

/// Bar resolution of the market data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1m")]
    Minute,
    #[default]
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "1d")]
    Daily,
}

impl Resolution {
    /// Timeframe label used in data file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Minute => "1m",
            Resolution::Hour => "1h",
            Resolution::Daily => "1d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Resolution::Minute => Duration::minutes(1),
            Resolution::Hour => Duration::hours(1),
            Resolution::Daily => Duration::days(1),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replay window and data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    /// Inclusive last day; absent means "up to now"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Starting capital, in the same currency as the price data
    pub initial_capital: f64,
    pub data_dir: String,
    #[serde(default)]
    pub resolution: Resolution,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            end_date: None,
            initial_capital: 100_000.0,
            data_dir: "data".to_string(),
            resolution: Resolution::Hour,
        }
    }
}

impl BacktestConfig {
    /// First instant at which signals may be emitted
    pub fn start_time(&self) -> DateTime<Utc> {
        midnight_utc(self.start_date)
    }

    /// Exclusive upper bound of the replay window
    pub fn end_time(&self) -> DateTime<Utc> {
        match self.end_date {
            Some(end) => midnight_utc(end) + Duration::days(1),
            None => Utc::now(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "initial_capital",
                value: self.initial_capital,
            });
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(ConfigError::EndBeforeStart {
                    start: self.start_date,
                    end,
                });
            }
        }
        Ok(())
    }
}

/// Instruments and the execution parameters handed to the host runtime.
///
/// `leverage` and `trailing_stop` are not used by the signal core; they are
/// validated here and passed through to the execution and risk layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    pub leverage: f64,
    /// Trailing stop as a fraction of the high-water price (0.02 = 2%)
    pub trailing_stop: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbols: vec!["BTCUSD".to_string()],
            leverage: 5.0,
            trailing_stop: 0.02,
        }
    }
}

impl TradingConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(Symbol::new).collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        let mut seen = std::collections::HashSet::new();
        for symbol in &self.symbols {
            if !seen.insert(symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(symbol.clone()));
            }
        }
        if !(self.leverage > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "leverage",
                value: self.leverage,
            });
        }
        check_fraction("trailing_stop", self.trailing_stop)
    }
}

/// Breakout strategy parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    /// Donchian channel window in bars
    pub channel_period: usize,
    /// History replayed before `start_date` to warm indicators up
    pub warmup_hours: i64,
    /// Validity horizon of emitted insights
    pub insight_period_hours: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub sizing: SizingConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            name: "donchian_breakout".to_string(),
            channel_period: 5,
            warmup_hours: 24,
            insight_period_hours: 24,
            confidence: None,
            sizing: SizingConfig::Fixed { weight: 0.10 },
        }
    }
}

impl StrategyConfig {
    pub fn warmup(&self) -> Duration {
        Duration::hours(self.warmup_hours)
    }

    pub fn insight_period(&self) -> Duration {
        Duration::hours(self.insight_period_hours)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_period == 0 {
            return Err(ConfigError::ZeroWindow {
                field: "channel_period",
                value: self.channel_period,
            });
        }
        if self.warmup_hours < 0 {
            return Err(ConfigError::NegativeHours {
                field: "warmup_hours",
                value: self.warmup_hours,
            });
        }
        if self.insight_period_hours <= 0 {
            return Err(ConfigError::NonPositive {
                field: "insight_period_hours",
                value: self.insight_period_hours as f64,
            });
        }
        if let Some(confidence) = self.confidence {
            check_fraction("confidence", confidence)?;
        }
        self.sizing.validate()
    }
}

/// How insight weights are chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SizingConfig {
    /// Same weight for every insight
    Fixed { weight: f64 },
    /// ATR-based sizing, see [`crate::risk::position_weight`]
    Volatility {
        atr_period: usize,
        risk_fraction: f64,
        stop_multiple: f64,
        max_weight: f64,
        #[serde(default)]
        fallback: VolatilityFallback,
    },
}

impl SizingConfig {
    pub fn default_volatility() -> Self {
        let sizer = PositionSizer::default();
        SizingConfig::Volatility {
            atr_period: 14,
            risk_fraction: sizer.risk_fraction,
            stop_multiple: sizer.stop_multiple,
            max_weight: sizer.max_weight,
            fallback: sizer.fallback,
        }
    }

    /// ATR window when volatility sizing is enabled
    pub fn atr_period(&self) -> Option<usize> {
        match self {
            SizingConfig::Fixed { .. } => None,
            SizingConfig::Volatility { atr_period, .. } => Some(*atr_period),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            SizingConfig::Fixed { weight } => check_fraction("weight", weight),
            SizingConfig::Volatility {
                atr_period,
                risk_fraction,
                stop_multiple,
                max_weight,
                ..
            } => {
                if atr_period == 0 {
                    return Err(ConfigError::ZeroWindow {
                        field: "atr_period",
                        value: atr_period,
                    });
                }
                check_fraction("risk_fraction", risk_fraction)?;
                if !(stop_multiple > 0.0) {
                    return Err(ConfigError::NonPositive {
                        field: "stop_multiple",
                        value: stop_multiple,
                    });
                }
                check_fraction("max_weight", max_weight)
            }
        }
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(NaiveTime::default()), Utc)
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::FractionOutOfRange { field, value })
    }
}
