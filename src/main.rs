//! Donchian breakout - main entry point
//!
//! This binary provides two subcommands:
//! - replay: drive the strategy over historical CSV data and emit insights
//! - validate: check a configuration file and print the resolved parameters

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "donchian-breakout")]
#[command(about = "Donchian channel breakout signals for crypto markets", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay historical bars through the strategy and write insights as JSON lines
    Replay {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/btcusd_1h.json")]
        config: String,

        /// Start date (YYYY-MM-DD), overrides the config
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), overrides the config
        #[arg(long)]
        end: Option<String>,

        /// Portfolio value used for position sizing, overrides the config
        #[arg(long)]
        capital: Option<f64>,

        /// Write insights to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/btcusd_1h.json")]
        config: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // Log file naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    // Console goes to stderr so insights on stdout stay machine-readable
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Replay { .. } => "replay",
        Commands::Validate { .. } => "validate",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Replay {
            config,
            start,
            end,
            capital,
            output,
        } => commands::replay::run(config, start, end, capital, output),

        Commands::Validate { config } => commands::validate::run(config),
    }
}
