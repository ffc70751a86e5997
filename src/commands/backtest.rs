//! Backtest command implementation

use anyhow::{Context, Result};
use breakout_engine::backtest::{write_series_csv, Replay};
use breakout_engine::data::HistoricalFeed;
use std::path::Path;
use tracing::info;

pub fn run(
    config_path: String,
    symbol_override: Option<String>,
    capital_override: Option<f64>,
) -> Result<()> {
    info!("Starting backtest");

    let (mut config, bars) = super::load_inputs(&config_path, symbol_override)?;

    if let Some(capital) = capital_override {
        info!("Overriding initial capital to: {:.2}", capital);
        config.backtest.initial_capital = capital;
        config
            .backtest
            .validate()
            .context("Invalid --capital override")?;
    }

    let first = bars.first().map(|b| b.date);
    let last = bars.last().map(|b| b.date);

    let engine = super::build_engine(&config)?;
    let mut feed = HistoricalFeed::new(config.symbol(), bars);
    let mut replay = Replay::new(engine, config.backtest.clone());

    info!("Running replay...");
    let result = replay.run(&mut feed).context("Replay failed")?;

    let series_path = Path::new(&config.backtest.results_dir)
        .join(format!("{}_1d_series.csv", config.instrument.symbol));
    write_series_csv(&series_path, &result.sessions)?;

    let metrics = &result.metrics;
    let counts = &result.counts;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS: {}", config.instrument.symbol);
    println!("{}", "=".repeat(60));
    if let (Some(first), Some(last)) = (first, last) {
        println!("Period:             {} to {}", first, last);
    }
    println!("Initial Capital:    {:.2}", config.backtest.initial_capital);
    println!("Final Equity:       {:.2}", metrics.final_equity);
    println!("Total Return:       {:.2}%", metrics.total_return);
    println!("Sharpe Ratio:       {:.2}", metrics.sharpe_ratio);
    println!("Max Drawdown:       {:.2}%", metrics.max_drawdown);
    println!("Win Rate:           {:.2}%", metrics.win_rate);
    println!("Profit Factor:      {:.2}", metrics.profit_factor);
    println!("Total Trades:       {}", metrics.total_trades);
    println!("Winning Trades:     {}", metrics.winning_trades);
    println!("Losing Trades:      {}", metrics.losing_trades);
    println!("Average Win:        {:.2}", metrics.avg_win);
    println!("Average Loss:       {:.2}", metrics.avg_loss);
    println!("Largest Win:        {:.2}", metrics.largest_win);
    println!("Largest Loss:       {:.2}", metrics.largest_loss);
    println!("Avg Trade Return:   {:.2}%", metrics.avg_trade_return);
    println!("Total Commission:   {:.2}", metrics.total_commission);
    println!("{}", "-".repeat(60));
    println!("Entries:            {}", counts.enter_long);
    println!("Stop Placements:    {}", counts.place_stop);
    println!("Stop Updates:       {}", counts.update_stop);
    println!("Skipped Sessions:   {}", counts.errors);
    println!("Final Lookback:     {}", replay.engine().lookback().current());
    println!("Series:             {}", series_path.display());
    println!("{}", "=".repeat(60));

    info!("Backtest completed successfully");

    Ok(())
}
