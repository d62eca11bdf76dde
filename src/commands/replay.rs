//! Replay command implementation

use anyhow::{Context, Result};
use chrono::NaiveDate;
use donchian_breakout::strategy::BreakoutStrategy;
use donchian_breakout::{data, Config, Direction, Insight};
use itertools::Itertools;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::{debug, info};

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid date: {}", s))
}

/// Replay historical bars through the strategy.
///
/// No orders are simulated, so the portfolio value passed to the sizer stays
/// at the configured capital for the whole run.
pub fn run(
    config_path: String,
    start_override: Option<String>,
    end_override: Option<String>,
    capital_override: Option<f64>,
    output: Option<String>,
) -> Result<()> {
    info!("Starting replay");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(start) = start_override {
        info!("Overriding start date to: {}", start);
        config.backtest.start_date = parse_date(&start)?;
    }

    if let Some(end) = end_override {
        info!("Overriding end date to: {}", end);
        config.backtest.end_date = Some(parse_date(&end)?);
    }

    if let Some(capital) = capital_override {
        info!("Overriding initial capital to: {:.2}", capital);
        config.backtest.initial_capital = capital;
    }

    config.validate().context("Invalid configuration after overrides")?;

    info!(
        leverage = config.trading.leverage,
        trailing_stop = config.trading.trailing_stop,
        "Execution parameters for the host runtime"
    );

    info!("Loading data from: {}", config.backtest.data_dir);
    let symbols = config.trading.symbols();
    debug!("Symbols: {:?}", symbols);

    let raw = data::load_multi_symbol(
        &config.backtest.data_dir,
        &symbols,
        config.backtest.resolution,
    )?;

    let from = config.backtest.start_time() - config.strategy.warmup();
    let to = config.backtest.end_time();
    let batches = data::into_batches(raw, from, to);
    info!("Prepared {} batches from {} to {}", batches.len(), from, to);

    let mut strategy = BreakoutStrategy::from_config(&config)?;
    let portfolio_value = config.backtest.initial_capital;

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut emitted: Vec<Insight> = Vec::new();
    for batch in &batches {
        for insight in strategy.on_bars(batch, portfolio_value) {
            serde_json::to_writer(&mut writer, &insight)?;
            writeln!(writer)?;
            emitted.push(insight);
        }
    }
    writer.flush()?;
    drop(writer);

    let counts = emitted
        .iter()
        .map(|i| (i.symbol.clone(), i.direction))
        .counts();

    eprintln!("\n{}", "=".repeat(60));
    eprintln!("REPLAY SUMMARY: {}", strategy.name());
    eprintln!("{}", "=".repeat(60));
    eprintln!("Batches:            {}", batches.len());
    eprintln!("Insights:           {}", emitted.len());
    for symbol in strategy.symbols().sorted() {
        let up = counts.get(&(symbol.clone(), Direction::Up)).copied().unwrap_or(0);
        let down = counts.get(&(symbol.clone(), Direction::Down)).copied().unwrap_or(0);
        eprintln!("{:<20}up {:>6}  down {:>6}", symbol.as_str(), up, down);
    }
    eprintln!("{}", "=".repeat(60));

    if let Some(path) = output {
        info!("Insights written to {}", path);
    }
    info!("Replay completed successfully");

    Ok(())
}
