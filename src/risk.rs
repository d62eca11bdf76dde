//! Volatility-based position sizing
//!
//! Converts an account risk budget and the instrument's ATR into a bounded
//! portfolio weight:
//!
//! ```text
//! weight = min(cap, (portfolio_value * risk_fraction) / (close * atr * stop_multiple))
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Symbol;

/// What to do when volatility cannot be measured (ATR is zero or not finite)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityFallback {
    /// Size at the weight cap. This silently disables risk-based sizing for
    /// the bar, so every use is logged at `warn`.
    #[default]
    MaxWeight,
    /// Emit no insight for the bar
    Skip,
}

/// Raw sizing formula.
///
/// `close` must be positive; the result is in (0, cap] for positive inputs
/// and exactly `cap` when `atr <= 0`.
pub fn position_weight(
    portfolio_value: f64,
    atr: f64,
    close: f64,
    risk_fraction: f64,
    stop_multiple: f64,
    cap: f64,
) -> f64 {
    if atr > 0.0 {
        let risk_amount = portfolio_value * risk_fraction;
        let stop_distance_value = close * atr * stop_multiple;
        cap.min(risk_amount / stop_distance_value)
    } else {
        cap
    }
}

/// Configured position sizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSizer {
    pub risk_fraction: f64,
    pub stop_multiple: f64,
    pub max_weight: f64,
    pub fallback: VolatilityFallback,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            risk_fraction: 0.02,
            stop_multiple: 1.5,
            max_weight: 0.2,
            fallback: VolatilityFallback::MaxWeight,
        }
    }
}

impl PositionSizer {
    /// Set risk per trade as a fraction (e.g., 0.02 = 2%)
    pub fn with_risk_fraction(mut self, risk: f64) -> Self {
        self.risk_fraction = risk;
        self
    }

    /// Set the stop distance in ATR multiples
    pub fn with_stop_multiple(mut self, multiple: f64) -> Self {
        self.stop_multiple = multiple;
        self
    }

    /// Set the maximum weight of a single position
    pub fn with_max_weight(mut self, cap: f64) -> Self {
        self.max_weight = cap;
        self
    }

    pub fn with_fallback(mut self, fallback: VolatilityFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Weight for one instrument, or `None` when the fallback policy says to
    /// skip the bar. A non-positive portfolio value never yields a weight.
    pub fn size(&self, symbol: &Symbol, portfolio_value: f64, atr: f64, close: f64) -> Option<f64> {
        if !(portfolio_value.is_finite() && portfolio_value > 0.0) {
            warn!(symbol = %symbol, portfolio_value, "Portfolio value not positive, skipping signal");
            return None;
        }

        if atr.is_finite() && atr > 0.0 {
            return Some(position_weight(
                portfolio_value,
                atr,
                close,
                self.risk_fraction,
                self.stop_multiple,
                self.max_weight,
            ));
        }

        match self.fallback {
            VolatilityFallback::MaxWeight => {
                warn!(
                    symbol = %symbol,
                    atr,
                    weight = self.max_weight,
                    "ATR unavailable, sizing at maximum weight"
                );
                Some(self.max_weight)
            }
            VolatilityFallback::Skip => {
                warn!(symbol = %symbol, atr, "ATR unavailable, skipping signal");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn btc() -> Symbol {
        Symbol::new("BTCUSD")
    }

    #[test]
    fn test_reference_sizing() {
        // 100_000 * 0.02 = 2_000 at risk; 50_000 * 100 * 1.5 = 7_500_000
        let weight = position_weight(100_000.0, 100.0, 50_000.0, 0.02, 1.5, 0.2);
        assert_relative_eq!(weight, 2_000.0 / 7_500_000.0, epsilon = 1e-12);
        assert_relative_eq!(weight, 0.000267, epsilon = 1e-6);
    }

    #[test]
    fn test_weight_is_capped() {
        let weight = position_weight(1_000_000.0, 0.01, 1.0, 0.02, 1.5, 0.2);
        assert_eq!(weight, 0.2);
    }

    #[test]
    fn test_zero_atr_returns_cap_exactly() {
        assert_eq!(position_weight(100_000.0, 0.0, 50_000.0, 0.02, 1.5, 0.2), 0.2);
    }

    #[test]
    fn test_weight_bounds_over_grid() {
        let values = [1.0, 1_000.0, 100_000.0, 10_000_000.0];
        let atrs = [0.001, 1.0, 100.0, 5_000.0];
        let closes = [0.01, 1.0, 50_000.0];

        for &value in &values {
            for &atr in &atrs {
                for &close in &closes {
                    let w = position_weight(value, atr, close, 0.02, 1.5, 0.2);
                    assert!(w > 0.0 && w <= 0.2, "w={w} value={value} atr={atr} close={close}");
                }
            }
        }
    }

    #[test]
    fn test_weight_monotonicity() {
        // Inputs chosen so the cap never binds
        let base = position_weight(100_000.0, 100.0, 50_000.0, 0.02, 1.5, 0.2);

        let higher_atr = position_weight(100_000.0, 200.0, 50_000.0, 0.02, 1.5, 0.2);
        let higher_close = position_weight(100_000.0, 100.0, 60_000.0, 0.02, 1.5, 0.2);
        let higher_value = position_weight(200_000.0, 100.0, 50_000.0, 0.02, 1.5, 0.2);

        assert!(higher_atr < base);
        assert!(higher_close < base);
        assert!(higher_value > base);
    }

    #[test]
    fn test_sizer_fallback_policies() {
        let sizer = PositionSizer::default();
        assert_eq!(sizer.size(&btc(), 100_000.0, 0.0, 50_000.0), Some(0.2));
        assert_eq!(sizer.size(&btc(), 100_000.0, f64::NAN, 50_000.0), Some(0.2));

        let strict = sizer.with_fallback(VolatilityFallback::Skip);
        assert_eq!(strict.size(&btc(), 100_000.0, 0.0, 50_000.0), None);
        assert!(strict.size(&btc(), 100_000.0, 100.0, 50_000.0).is_some());
    }

    #[test]
    fn test_sizer_rejects_non_positive_portfolio() {
        let sizer = PositionSizer::default();
        for value in [0.0, -50_000.0, f64::NAN] {
            assert_eq!(sizer.size(&btc(), value, 100.0, 50_000.0), None);
            assert_eq!(sizer.size(&btc(), value, 0.0, 50_000.0), None);
        }
    }

    #[test]
    fn test_sizer_builder() {
        let sizer = PositionSizer::default()
            .with_risk_fraction(0.01)
            .with_stop_multiple(2.0)
            .with_max_weight(0.5);

        let weight = sizer.size(&btc(), 100_000.0, 10.0, 100.0).unwrap();
        // 1_000 / (100 * 10 * 2) = 0.5, right at the cap
        assert_relative_eq!(weight, 0.5, epsilon = 1e-12);
    }
}
