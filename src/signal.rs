//! Donchian breakout evaluation
//!
//! Pure decision rule: a close at or above the upper band is an Up breakout,
//! a close at or below the lower band is a Down breakout, anything in between
//! is no signal. There are no confirmation filters.

use chrono::Duration;

use crate::indicators::ChannelState;
use crate::{Candle, Direction, Insight, Symbol};

/// Breakout direction for a bar against a channel snapshot.
///
/// The upper band is tested first, so a degenerate channel where both bands
/// are crossed resolves to `Up`.
pub fn breakout_direction(close: f64, channel: &ChannelState) -> Option<Direction> {
    if !channel.is_ready {
        return None;
    }

    if close >= channel.upper {
        Some(Direction::Up)
    } else if close <= channel.lower {
        Some(Direction::Down)
    } else {
        None
    }
}

/// Turns breakouts into insights with a fixed validity horizon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalEvaluator {
    period: Duration,
    confidence: Option<f64>,
}

impl SignalEvaluator {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Evaluate one bar. Returns at most one insight; `None` when the channel
    /// is not ready or the close is inside the channel.
    pub fn evaluate(
        &self,
        symbol: &Symbol,
        bar: &Candle,
        channel: &ChannelState,
        weight: f64,
    ) -> Option<Insight> {
        self.evaluate_sized(symbol, bar, channel, |_| Some(weight))
    }

    /// Like [`evaluate`](Self::evaluate), but the weight is computed by `size`
    /// only once a breakout is found. `size` returning `None` drops the signal.
    pub fn evaluate_sized<F>(
        &self,
        symbol: &Symbol,
        bar: &Candle,
        channel: &ChannelState,
        size: F,
    ) -> Option<Insight>
    where
        F: FnOnce(Direction) -> Option<f64>,
    {
        let direction = breakout_direction(bar.close, channel)?;
        let weight = size(direction)?;

        Some(Insight::new(
            symbol.clone(),
            direction,
            weight,
            self.confidence,
            bar.datetime,
            self.period,
        ))
    }
}
