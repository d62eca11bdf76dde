//! Validate command implementation

use anyhow::Result;
use donchian_breakout::config::SizingConfig;
use donchian_breakout::{BreakoutStrategy, Config};
use tracing::info;

pub fn run(config_path: String) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    let strategy = BreakoutStrategy::from_config(&config)?;
    info!("Configuration {} is valid", config_path);

    let end = config
        .backtest
        .end_date
        .map_or_else(|| "now".to_string(), |d| d.to_string());

    println!("Strategy:           {}", strategy.name());
    println!("Symbols:            {}", config.trading.symbols.join(", "));
    println!("Period:             {} .. {}", config.backtest.start_date, end);
    println!("Resolution:         {}", config.backtest.resolution);
    println!("Initial Capital:    {:.2}", config.backtest.initial_capital);
    println!("Channel Period:     {}", config.strategy.channel_period);
    println!("Warm-up:            {}h", config.strategy.warmup_hours);
    println!("Insight Period:     {}h", config.strategy.insight_period_hours);
    match &config.strategy.sizing {
        SizingConfig::Fixed { weight } => {
            println!("Sizing:             fixed {:.2}", weight);
        }
        SizingConfig::Volatility {
            atr_period,
            risk_fraction,
            stop_multiple,
            max_weight,
            fallback,
        } => {
            println!(
                "Sizing:             ATR({}) risk {:.3} stop {:.2}x cap {:.2} fallback {:?}",
                atr_period, risk_fraction, stop_multiple, max_weight, fallback
            );
        }
    }
    println!("Leverage:           {:.1}x", config.trading.leverage);
    println!("Trailing Stop:      {:.2}%", config.trading.trailing_stop * 100.0);

    Ok(())
}
