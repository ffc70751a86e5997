pub mod backtest;
pub mod decide;

use anyhow::{Context, Result};
use breakout_engine::{config::Config, data, BreakoutEngine, PriceBar};
use tracing::info;

/// Load config, apply the symbol override, and load that symbol's daily bars
pub(crate) fn load_inputs(
    config_path: &str,
    symbol_override: Option<String>,
) -> Result<(Config, Vec<PriceBar>)> {
    let mut config = Config::from_file(config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(symbol) = symbol_override {
        info!("Overriding symbol to: {}", symbol);
        config.instrument.symbol = symbol;
    }

    let path = config.data_file();
    let bars = data::load_csv(&path)
        .with_context(|| format!("Failed to load data for {}", config.instrument.symbol))?;
    if bars.is_empty() {
        anyhow::bail!("No bars in {}", path.display());
    }

    Ok((config, bars))
}

pub(crate) fn build_engine(config: &Config) -> Result<BreakoutEngine> {
    BreakoutEngine::new(config.symbol(), config.engine.clone())
        .context("Failed to create breakout engine")
}
