//! Volatility-adaptive lookback
//!
//! The breakout window stretches when volatility rises and shrinks when it falls:
//! `next = round(current * (1 + (today_vol - yesterday_vol) / today_vol))`, clamped
//! into `[floor, ceiling]`. Volatilities are population standard deviations of two
//! overlapping 30-close windows taken from the last 31 closes.

use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::indicators::{mean, population_std_dev};

/// Samples per volatility window
pub const VOLATILITY_WINDOW: usize = 30;

/// Closes needed for one adaptation (two overlapping windows)
pub const REQUIRED_CLOSES: usize = VOLATILITY_WINDOW + 1;

/// Volatility below this fraction of the mean price is treated as zero
const DEGENERATE_VOL_RATIO: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackState {
    current: usize,
    floor: usize,
    ceiling: usize,
}

/// Day-over-day volatility measurement behind one adaptation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityChange {
    pub today_vol: f64,
    pub yesterday_vol: f64,
    pub delta: f64,
}

impl LookbackState {
    pub fn new(current: usize, floor: usize, ceiling: usize) -> EngineResult<Self> {
        if floor == 0 || floor > ceiling || current < floor || current > ceiling {
            return Err(EngineError::InvalidConfiguration(format!(
                "lookback {} outside [{}, {}]",
                current, floor, ceiling
            )));
        }
        Ok(Self {
            current,
            floor,
            ceiling,
        })
    }

    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        Self::new(
            config.initial_lookback,
            config.lookback_floor,
            config.lookback_ceiling,
        )
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn floor(&self) -> usize {
        self.floor
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Next state for a relative volatility change of `delta`
    pub fn apply_delta(&self, delta: f64) -> Self {
        let scaled = (self.current as f64 * (1.0 + delta)).round_ties_even();
        let current = if scaled >= self.ceiling as f64 {
            self.ceiling
        } else if scaled <= self.floor as f64 {
            self.floor
        } else {
            scaled as usize
        };
        Self { current, ..*self }
    }

    /// Adapt to the newest `REQUIRED_CLOSES` closes (oldest first).
    ///
    /// Returns the next state without touching `self`.
    pub fn adapt(&self, closes: &[f64]) -> EngineResult<(Self, VolatilityChange)> {
        let change = volatility_change(closes)?;
        Ok((self.apply_delta(change.delta), change))
    }
}

/// Relative volatility change across the newest 31 closes
pub fn volatility_change(closes: &[f64]) -> EngineResult<VolatilityChange> {
    if closes.len() < REQUIRED_CLOSES {
        return Err(EngineError::InsufficientHistory {
            required: REQUIRED_CLOSES,
            actual: closes.len(),
        });
    }

    let window = &closes[closes.len() - REQUIRED_CLOSES..];
    if let Some(bad) = window.iter().copied().find(|c| !c.is_finite()) {
        return Err(EngineError::InvalidPrice(bad));
    }

    let recent = &window[1..];
    let prior = &window[..VOLATILITY_WINDOW];

    let today_vol = population_std_dev(recent);
    let yesterday_vol = population_std_dev(prior);

    if !(today_vol > DEGENERATE_VOL_RATIO * mean(recent).abs()) {
        return Err(EngineError::DegenerateVolatility { today_vol });
    }

    Ok(VolatilityChange {
        today_vol,
        yesterday_vol,
        delta: (today_vol - yesterday_vol) / today_vol,
    })
}
