//! Configuration management
//!
//! Loads the JSON run configuration. Environment variables (optionally from a
//! `.env` file) can override the data directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::engine::EngineConfig;
use crate::Symbol;

/// Environment variable that overrides `backtest.data_dir`
pub const DATA_DIR_ENV: &str = "BREAKOUT_DATA_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        if let Ok(data_dir) = std::env::var(DATA_DIR_ENV) {
            config.backtest.data_dir = data_dir;
        }

        config
            .engine
            .validate()
            .context("Invalid engine section in config")?;
        config
            .backtest
            .validate()
            .context("Invalid backtest section in config")?;

        Ok(config)
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.instrument.symbol)
    }

    /// Daily CSV for the configured instrument: `{data_dir}/{symbol}_1d.csv`
    pub fn data_file(&self) -> std::path::PathBuf {
        Path::new(&self.backtest.data_dir).join(format!("{}_1d.csv", self.instrument.symbol))
    }
}

/// Instrument configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        InstrumentConfig {
            symbol: "SPY".to_string(),
        }
    }
}

/// Replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub data_dir: String,
    pub results_dir: String,
    pub initial_capital: f64,
    /// Commission as a fraction of traded value
    pub commission: f64,
    /// Adverse slippage as a fraction of price on entries
    pub slippage: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
            results_dir: "results".to_string(),
            initial_capital: 100_000.0,
            commission: 0.0,
            slippage: 0.0,
        }
    }
}

impl BacktestConfig {
    /// Capital must be positive; cost fractions finite and non-negative
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            anyhow::bail!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            );
        }
        for (name, value) in [("commission", self.commission), ("slippage", self.slippage)] {
            if !(value.is_finite() && value >= 0.0) {
                anyhow::bail!("{} must be a non-negative fraction, got {}", name, value);
            }
        }
        Ok(())
    }
}
