//! Streaming technical indicators powered by the `ta` crate
//!
//! The strategy advances indicators one bar at a time, so these are stateful
//! wrappers rather than whole-series functions:
//! - [`DonchianChannel`]: highest high / lowest low over the last N bars
//! - [`Atr`]: average true range, the volatility input for position sizing
//!
//! Both expose a copyable snapshot ([`ChannelState`], [`VolatilityState`])
//! that carries an explicit readiness flag. `ta` indicators produce a value
//! from the first sample, so readiness is tracked here by counting samples.

use ta::indicators::{AverageTrueRange, Maximum, Minimum};
use ta::{Close, High, Low, Next};
use thiserror::Error;

use crate::Candle;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("{indicator} period must be >= 1, got {period}")]
    InvalidPeriod {
        indicator: &'static str,
        period: usize,
    },
}

impl High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

// =============================================================================
// Donchian Channel
// =============================================================================

/// Snapshot of a Donchian channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    pub upper: f64,
    pub lower: f64,
    pub is_ready: bool,
}

impl ChannelState {
    /// State before any bar has been observed
    pub fn empty() -> Self {
        Self {
            upper: f64::NAN,
            lower: f64::NAN,
            is_ready: false,
        }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Rolling highest-high / lowest-low channel
#[derive(Debug, Clone)]
pub struct DonchianChannel {
    period: usize,
    upper: Maximum,
    lower: Minimum,
    samples: usize,
    state: ChannelState,
}

impl DonchianChannel {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let invalid = || IndicatorError::InvalidPeriod {
            indicator: "donchian",
            period,
        };
        if period == 0 {
            return Err(invalid());
        }

        Ok(Self {
            period,
            upper: Maximum::new(period).map_err(|_| invalid())?,
            lower: Minimum::new(period).map_err(|_| invalid())?,
            samples: 0,
            state: ChannelState::empty(),
        })
    }

    /// Fold one bar into the channel and return the new snapshot
    pub fn update(&mut self, candle: &Candle) -> ChannelState {
        self.samples += 1;
        self.state = ChannelState {
            upper: self.upper.next(candle.high),
            lower: self.lower.next(candle.low),
            is_ready: self.samples >= self.period,
        };
        self.state
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready
    }
}

// =============================================================================
// Average True Range
// =============================================================================

/// Snapshot of the volatility indicator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityState {
    pub value: f64,
    pub is_ready: bool,
}

impl VolatilityState {
    pub fn empty() -> Self {
        Self {
            value: 0.0,
            is_ready: false,
        }
    }
}

/// Streaming ATR
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    inner: AverageTrueRange,
    samples: usize,
    state: VolatilityState,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let invalid = || IndicatorError::InvalidPeriod {
            indicator: "atr",
            period,
        };
        if period == 0 {
            return Err(invalid());
        }

        Ok(Self {
            period,
            inner: AverageTrueRange::new(period).map_err(|_| invalid())?,
            samples: 0,
            state: VolatilityState::empty(),
        })
    }

    pub fn update(&mut self, candle: &Candle) -> VolatilityState {
        self.samples += 1;
        self.state = VolatilityState {
            value: self.inner.next(candle),
            is_ready: self.samples >= self.period,
        };
        self.state
    }

    pub fn state(&self) -> VolatilityState {
        self.state
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready
    }
}
