//! Breakout engine - command line entry point
//!
//! Subcommands:
//! - backtest: replay the engine over a daily CSV and report performance
//! - decide: replay history and print the latest session's decision and state

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "breakout-engine")]
#[command(about = "Volatility-adaptive breakout entries with a trailing stop", long_about = None)]
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
    /// Replay the engine over historical daily bars
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/spy_1d.json")]
        config: String,

        /// Instrument symbol (overrides config file)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Initial capital
        #[arg(long)]
        capital: Option<f64>,
    },

    /// Print the decision for the most recent session in the data file
    Decide {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/spy_1d.json")]
        config: String,

        /// Instrument symbol (overrides config file)
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // logs/{command}_{timestamp}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format as the console, without colors
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
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Backtest { .. } => "backtest",
        Commands::Decide { .. } => "decide",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Backtest {
            config,
            symbol,
            capital,
        } => commands::backtest::run(config, symbol, capital),

        Commands::Decide { config, symbol } => commands::decide::run(config, symbol),
    }
}
