//! Breakout strategy orchestration
//!
//! [`BreakoutStrategy`] owns one [`InstrumentState`] per registered symbol and
//! is driven by the host runtime with one [`BarBatch`] per timestamp. For each
//! instrument present in the batch it:
//!
//! 1. evaluates the bar against the channel formed by the *previous* bars,
//! 2. folds the bar into the instrument's indicators,
//! 3. moves the instrument from `WarmingUp` to `Ready` once every indicator
//!    window is filled.
//!
//! Instruments never read each other's state, so the order in which they are
//! processed cannot change any outcome.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, SizingConfig};
use crate::indicators::{Atr, ChannelState, DonchianChannel, IndicatorError, VolatilityState};
use crate::risk::PositionSizer;
use crate::signal::SignalEvaluator;
use crate::{Candle, Insight, Symbol};

#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("symbol already registered: {0}")]
    DuplicateSymbol(Symbol),
}

/// Bars sharing one timestamp. Instruments without data at that time are
/// simply absent.
#[derive(Debug, Clone, PartialEq)]
pub struct BarBatch {
    pub time: DateTime<Utc>,
    pub bars: HashMap<Symbol, Candle>,
}

impl BarBatch {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time,
            bars: HashMap::new(),
        }
    }

    pub fn with_bar(mut self, symbol: Symbol, candle: Candle) -> Self {
        self.insert(symbol, candle);
        self
    }

    pub fn insert(&mut self, symbol: Symbol, candle: Candle) {
        self.bars.insert(symbol, candle);
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Candle> {
        self.bars.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Lifecycle of one instrument. Transitions only forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WarmingUp,
    Ready,
}

/// How insight weights are produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    Fixed(f64),
    Volatility(PositionSizer),
}

impl From<&SizingConfig> for Sizing {
    fn from(config: &SizingConfig) -> Self {
        match *config {
            SizingConfig::Fixed { weight } => Sizing::Fixed(weight),
            SizingConfig::Volatility {
                risk_fraction,
                stop_multiple,
                max_weight,
                fallback,
                ..
            } => Sizing::Volatility(
                PositionSizer::default()
                    .with_risk_fraction(risk_fraction)
                    .with_stop_multiple(stop_multiple)
                    .with_max_weight(max_weight)
                    .with_fallback(fallback),
            ),
        }
    }
}

/// Read-only inputs shared by every instrument in one cycle
struct Cycle<'a> {
    evaluator: &'a SignalEvaluator,
    sizing: &'a Sizing,
    portfolio_value: f64,
    trading: bool,
    summary: bool,
}

/// Indicator state owned by the strategy for a single instrument
#[derive(Debug, Clone)]
pub struct InstrumentState {
    symbol: Symbol,
    channel: DonchianChannel,
    volatility: Option<Atr>,
    phase: Phase,
    last_bar_time: Option<DateTime<Utc>>,
    bars_seen: usize,
}

impl InstrumentState {
    pub fn new(
        symbol: Symbol,
        channel_period: usize,
        atr_period: Option<usize>,
    ) -> Result<Self, IndicatorError> {
        Ok(Self {
            symbol,
            channel: DonchianChannel::new(channel_period)?,
            volatility: atr_period.map(Atr::new).transpose()?,
            phase: Phase::WarmingUp,
            last_bar_time: None,
            bars_seen: 0,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn channel(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn volatility(&self) -> Option<VolatilityState> {
        self.volatility.as_ref().map(Atr::state)
    }

    pub fn last_bar_time(&self) -> Option<DateTime<Utc>> {
        self.last_bar_time
    }

    /// Accepted bars folded into the indicators so far
    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    fn indicators_ready(&self) -> bool {
        self.channel.is_ready() && self.volatility.as_ref().map_or(true, Atr::is_ready)
    }

    fn on_bar(&mut self, bar: &Candle, cycle: &Cycle<'_>) -> Option<Insight> {
        if let Err(e) = bar.validate() {
            debug!(symbol = %self.symbol, time = %bar.datetime, error = %e, "Skipping invalid bar");
            return None;
        }

        if let Some(last) = self.last_bar_time {
            if bar.datetime <= last {
                warn!(
                    symbol = %self.symbol,
                    time = %bar.datetime,
                    last = %last,
                    "Skipping out-of-order bar"
                );
                return None;
            }
        }

        let channel = self.channel.state();
        let volatility = self.volatility();

        if cycle.summary {
            self.log_summary(bar, &channel, volatility.as_ref());
        }

        let insight = if cycle.trading && self.is_ready() {
            self.decide(bar, &channel, volatility.as_ref(), cycle)
        } else {
            None
        };

        self.channel.update(bar);
        if let Some(atr) = self.volatility.as_mut() {
            atr.update(bar);
        }
        self.last_bar_time = Some(bar.datetime);
        self.bars_seen += 1;

        if self.phase == Phase::WarmingUp && self.indicators_ready() {
            self.phase = Phase::Ready;
            info!(symbol = %self.symbol, bars = self.bars_seen, "Indicators ready");
        }

        insight
    }

    fn decide(
        &self,
        bar: &Candle,
        channel: &ChannelState,
        volatility: Option<&VolatilityState>,
        cycle: &Cycle<'_>,
    ) -> Option<Insight> {
        let insight = cycle
            .evaluator
            .evaluate_sized(&self.symbol, bar, channel, |_| match cycle.sizing {
                Sizing::Fixed(weight) => Some(*weight),
                Sizing::Volatility(sizer) => {
                    let atr = volatility.map_or(0.0, |v| v.value);
                    sizer.size(&self.symbol, cycle.portfolio_value, atr, bar.close)
                }
            })?;
        info!(
            symbol = %self.symbol,
            direction = %insight.direction,
            weight = insight.weight,
            close = bar.close,
            upper = channel.upper,
            lower = channel.lower,
            "Breakout signal"
        );
        Some(insight)
    }

    fn log_summary(
        &self,
        bar: &Candle,
        channel: &ChannelState,
        volatility: Option<&VolatilityState>,
    ) {
        if !self.is_ready() {
            debug!(symbol = %self.symbol, bars = self.bars_seen, "Indicators not ready yet");
            return;
        }

        info!(
            symbol = %self.symbol,
            time = %bar.datetime,
            close = bar.close,
            upper = channel.upper,
            lower = channel.lower,
            volume = bar.volume,
            atr = volatility.map(|v| v.value),
            "Daily summary"
        );
    }
}

/// Donchian breakout strategy over a fixed set of instruments
#[derive(Debug, Clone)]
pub struct BreakoutStrategy {
    name: String,
    channel_period: usize,
    atr_period: Option<usize>,
    evaluator: SignalEvaluator,
    sizing: Sizing,
    instruments: Vec<InstrumentState>,
    index: HashMap<Symbol, usize>,
    trading_start: Option<DateTime<Utc>>,
    warmed_up: bool,
    last_summary_day: Option<NaiveDate>,
}

impl BreakoutStrategy {
    /// Create a strategy with no instruments. `atr_period` is required when
    /// `sizing` is volatility based; without it the sizer always falls back.
    pub fn new(
        name: impl Into<String>,
        channel_period: usize,
        atr_period: Option<usize>,
        evaluator: SignalEvaluator,
        sizing: Sizing,
    ) -> Self {
        Self {
            name: name.into(),
            channel_period,
            atr_period,
            evaluator,
            sizing,
            instruments: Vec::new(),
            index: HashMap::new(),
            trading_start: None,
            warmed_up: false,
            last_summary_day: None,
        }
    }

    /// Build the strategy described by `config` and register its symbols
    pub fn from_config(config: &Config) -> Result<Self, StrategyError> {
        let strategy_config = &config.strategy;
        let evaluator = SignalEvaluator::new(strategy_config.insight_period())
            .with_confidence(strategy_config.confidence);

        let mut strategy = Self::new(
            strategy_config.name.clone(),
            strategy_config.channel_period,
            strategy_config.sizing.atr_period(),
            evaluator,
            Sizing::from(&strategy_config.sizing),
        )
        .with_trading_start(config.backtest.start_time());

        for symbol in config.trading.symbols() {
            strategy.register(symbol)?;
        }

        info!(
            strategy = %strategy.name,
            symbols = strategy.instruments.len(),
            channel_period = strategy.channel_period,
            atr_period = ?strategy.atr_period,
            "Strategy initialized"
        );

        Ok(strategy)
    }

    /// Suppress every signal for batches stamped before `start`. Earlier
    /// batches still advance the indicators.
    pub fn with_trading_start(mut self, start: DateTime<Utc>) -> Self {
        self.trading_start = Some(start);
        self
    }

    pub fn register(&mut self, symbol: Symbol) -> Result<(), StrategyError> {
        if self.index.contains_key(&symbol) {
            return Err(StrategyError::DuplicateSymbol(symbol));
        }

        let state = InstrumentState::new(symbol.clone(), self.channel_period, self.atr_period)?;
        self.index.insert(symbol, self.instruments.len());
        self.instruments.push(state);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.instruments.iter().map(InstrumentState::symbol)
    }

    pub fn instrument(&self, symbol: &Symbol) -> Option<&InstrumentState> {
        self.index.get(symbol).map(|&i| &self.instruments[i])
    }

    /// Whether the algorithm-level warm-up period is over
    pub fn is_warming_up(&self) -> bool {
        !self.warmed_up
    }

    /// Whether orders for `symbol` may be placed. The host runtime must drop
    /// any order it initiates on its own while this is false.
    pub fn can_trade(&self, symbol: &Symbol) -> bool {
        self.warmed_up && self.instrument(symbol).is_some_and(InstrumentState::is_ready)
    }

    /// Process one batch and return zero or one insight per instrument, in
    /// registration order.
    ///
    /// Warm-up and the daily summary are keyed on `batch.time`; a bar stamped
    /// with any other time is skipped. `portfolio_value` must be positive for
    /// volatility sizing to produce a weight.
    pub fn on_bars(&mut self, batch: &BarBatch, portfolio_value: f64) -> Vec<Insight> {
        let trading = self.advance_warmup(batch.time);
        let summary = self.take_summary_slot(batch.time);

        if batch.bars.keys().any(|s| !self.index.contains_key(s)) {
            debug!(time = %batch.time, "Ignoring bars for unregistered symbols");
        }

        let cycle = Cycle {
            evaluator: &self.evaluator,
            sizing: &self.sizing,
            portfolio_value,
            trading,
            summary,
        };

        self.instruments
            .iter_mut()
            .filter_map(|state| {
                let bar = batch.get(state.symbol())?;
                if bar.datetime != batch.time {
                    warn!(
                        symbol = %state.symbol(),
                        bar_time = %bar.datetime,
                        batch_time = %batch.time,
                        "Skipping bar stamped outside its batch"
                    );
                    return None;
                }
                state.on_bar(bar, &cycle)
            })
            .collect()
    }

    fn advance_warmup(&mut self, time: DateTime<Utc>) -> bool {
        if !self.warmed_up && self.trading_start.map_or(true, |start| time >= start) {
            self.warmed_up = true;
            info!(strategy = %self.name, time = %time, "Warm-up complete");
        }
        self.warmed_up
    }

    /// One summary per UTC day, taken at the first batch stamped at hour 0
    fn take_summary_slot(&mut self, time: DateTime<Utc>) -> bool {
        let day = time.date_naive();
        if time.hour() != 0 || self.last_summary_day == Some(day) {
            return false;
        }
        self.last_summary_day = Some(day);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn candle(hour: i64, close: f64) -> Candle {
        Candle::new_unchecked(t0() + Duration::hours(hour), close, close, close, close, 1.0)
    }

    fn fixed_strategy(symbols: &[&str]) -> BreakoutStrategy {
        let mut strategy = BreakoutStrategy::new(
            "test",
            5,
            None,
            SignalEvaluator::new(Duration::hours(24)),
            Sizing::Fixed(0.1),
        );
        for s in symbols {
            strategy.register(Symbol::new(s)).unwrap();
        }
        strategy
    }

    fn feed(strategy: &mut BreakoutStrategy, symbol: &str, closes: &[f64]) -> Vec<Insight> {
        let symbol = Symbol::new(symbol);
        let mut out = Vec::new();
        for (i, &close) in closes.iter().enumerate() {
            let batch = BarBatch::new(t0() + Duration::hours(i as i64))
                .with_bar(symbol.clone(), candle(i as i64, close));
            out.extend(strategy.on_bars(&batch, 100_000.0));
        }
        out
    }

    #[test]
    fn test_phase_transition_after_window() {
        let mut strategy = fixed_strategy(&["BTCUSD"]);
        let btc = Symbol::new("BTCUSD");

        feed(&mut strategy, "BTCUSD", &[10.0, 11.0, 12.0, 13.0]);
        assert_eq!(strategy.instrument(&btc).unwrap().phase(), Phase::WarmingUp);
        assert!(!strategy.can_trade(&btc));

        let batch = BarBatch::new(t0() + Duration::hours(4)).with_bar(btc.clone(), candle(4, 14.0));
        strategy.on_bars(&batch, 100_000.0);
        assert_eq!(strategy.instrument(&btc).unwrap().phase(), Phase::Ready);
        assert!(strategy.can_trade(&btc));
    }

    #[test]
    fn test_breakout_uses_prior_channel() {
        let mut strategy = fixed_strategy(&["BTCUSD"]);
        let insights = feed(&mut strategy, "BTCUSD", &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].direction, Direction::Up);
        assert_eq!(insights[0].weight, 0.1);
        assert_eq!(insights[0].generated_at, t0() + Duration::hours(5));
    }

    #[test]
    fn test_zero_price_bar_is_skipped() {
        let mut strategy = fixed_strategy(&["BTCUSD"]);
        feed(&mut strategy, "BTCUSD", &[10.0, 11.0, 0.0, 12.0]);

        let state = strategy.instrument(&Symbol::new("BTCUSD")).unwrap();
        assert_eq!(state.bars_seen(), 3);
        assert_eq!(state.phase(), Phase::WarmingUp);
    }

    #[test]
    fn test_out_of_order_bar_is_skipped() {
        let mut strategy = fixed_strategy(&["BTCUSD"]);
        let btc = Symbol::new("BTCUSD");
        feed(&mut strategy, "BTCUSD", &[10.0, 11.0, 12.0]);

        let stale = BarBatch::new(t0() + Duration::hours(1)).with_bar(btc.clone(), candle(1, 50.0));
        assert!(strategy.on_bars(&stale, 100_000.0).is_empty());

        let state = strategy.instrument(&btc).unwrap();
        assert_eq!(state.bars_seen(), 3);
        assert_eq!(state.last_bar_time(), Some(t0() + Duration::hours(2)));
    }

    #[test]
    fn test_unregistered_symbols_are_ignored() {
        let mut strategy = fixed_strategy(&["BTCUSD"]);
        let batch = BarBatch::new(t0()).with_bar(Symbol::new("DOGEUSD"), candle(0, 1.0));
        assert!(strategy.on_bars(&batch, 100_000.0).is_empty());
        assert!(strategy.instrument(&Symbol::new("DOGEUSD")).is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut strategy = fixed_strategy(&["BTCUSD"]);
        assert_eq!(
            strategy.register(Symbol::new("BTCUSD")),
            Err(StrategyError::DuplicateSymbol(Symbol::new("BTCUSD")))
        );
    }

    #[test]
    fn test_trading_start_suppresses_signals() {
        let mut strategy = fixed_strategy(&["BTCUSD"]).with_trading_start(t0() + Duration::hours(6));
        assert!(strategy.is_warming_up());
        assert!(!strategy.can_trade(&Symbol::new("BTCUSD")));

        // Breakout at hour 5 falls inside the warm-up period
        let insights = feed(&mut strategy, "BTCUSD", &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        assert!(!strategy.is_warming_up());
        assert!(strategy.can_trade(&Symbol::new("BTCUSD")));
        assert!(!strategy.can_trade(&Symbol::new("ETHUSD")));
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].generated_at, t0() + Duration::hours(6));
    }

    #[test]
    fn test_bar_with_mismatched_batch_time_is_skipped() {
        let btc = Symbol::new("BTCUSD");
        let mut strategy = fixed_strategy(&["BTCUSD"]);

        let batch = BarBatch::new(t0() + Duration::hours(1)).with_bar(btc.clone(), candle(0, 10.0));
        assert!(strategy.on_bars(&batch, 100_000.0).is_empty());

        let state = strategy.instrument(&btc).unwrap();
        assert_eq!(state.bars_seen(), 0);
        assert_eq!(state.last_bar_time(), None);
    }

    #[test]
    fn test_volatility_sizing_requires_atr_ready() {
        let mut strategy = BreakoutStrategy::new(
            "test",
            5,
            Some(14),
            SignalEvaluator::new(Duration::hours(48)),
            Sizing::Volatility(PositionSizer::default()),
        );
        strategy.register(Symbol::new("BTCUSD")).unwrap();

        // Strictly rising closes break out on every bar once ready
        let closes: Vec<f64> = (0..16).map(|i| 100.0 + i as f64).collect();
        let insights = feed(&mut strategy, "BTCUSD", &closes);

        // Channel is ready after 5 bars but the ATR needs 14
        assert_eq!(insights.len(), 2);
        assert!(insights.iter().all(|i| i.direction == Direction::Up));
        assert!(insights.iter().all(|i| i.period() == Duration::hours(48)));
    }

    #[test]
    fn test_summary_taken_once_per_day() {
        let mut strategy = fixed_strategy(&["BTCUSD"]);
        assert!(strategy.take_summary_slot(t0()));
        assert!(!strategy.take_summary_slot(t0()));
        assert!(!strategy.take_summary_slot(t0() + Duration::hours(1)));
        assert!(strategy.take_summary_slot(t0() + Duration::days(1)));
    }

    #[test]
    fn test_from_config_registers_symbols() {
        let config = Config::multi_asset(&["BTCUSD", "ETHUSD", "LTCUSD"]);
        let strategy = BreakoutStrategy::from_config(&config).unwrap();

        let symbols: Vec<&str> = strategy.symbols().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["BTCUSD", "ETHUSD", "LTCUSD"]);
        assert_eq!(strategy.name(), "donchian_atr_basket");
        assert!(strategy
            .instrument(&Symbol::new("ETHUSD"))
            .unwrap()
            .volatility()
            .is_some());
    }
}
