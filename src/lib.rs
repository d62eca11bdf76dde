//! Donchian Breakout Signals
//!
//! Decision core of a crypto breakout strategy. For every instrument it keeps
//! a Donchian channel (and optionally an ATR), advances it one bar at a time,
//! and emits at most one directional, time-bounded [`Insight`] per bar when
//! the close breaks out of the channel.
//!
//! Order execution, portfolio construction and risk management belong to the
//! host trading runtime that consumes the insights.
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use donchian_breakout::strategy::{BarBatch, BreakoutStrategy};
//! use donchian_breakout::{Candle, Config, Direction, Symbol};
//!
//! let mut config = Config::single_asset();
//! config.backtest.start_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let mut strategy = BreakoutStrategy::from_config(&config).unwrap();
//!
//! let btc = Symbol::new("BTCUSD");
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let mut insights = Vec::new();
//! for (i, close) in [10.0, 11.0, 12.0, 13.0, 14.0, 15.0].into_iter().enumerate() {
//!     let time = start + Duration::hours(i as i64);
//!     let bar = Candle::new(time, close, close, close, close, 1.0).unwrap();
//!     let batch = BarBatch::new(time).with_bar(btc.clone(), bar);
//!     insights.extend(strategy.on_bars(&batch, 100_000.0));
//! }
//!
//! assert_eq!(insights.len(), 1);
//! assert_eq!(insights[0].direction, Direction::Up);
//! ```

pub mod config;
pub mod data;
pub mod indicators;
pub mod risk;
pub mod signal;
pub mod strategy;
pub mod types;

pub use config::Config;
pub use strategy::BreakoutStrategy;
pub use types::*;
