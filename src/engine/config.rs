//! Breakout engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Smallest lookback the adapter may produce (default: 10)
    pub lookback_floor: usize,

    /// Largest lookback the adapter may produce (default: 30)
    pub lookback_ceiling: usize,

    /// Lookback used before the first adaptation (default: 20)
    pub initial_lookback: usize,

    /// Initial stop as a fraction of the breakout level (default: 0.98)
    pub initial_stop_risk: f64,

    /// Trailing stop as a fraction of the running high (default: 0.90)
    pub trailing_stop_risk: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback_floor: 10,
            lookback_ceiling: 30,
            initial_lookback: 20,
            initial_stop_risk: 0.98,
            trailing_stop_risk: 0.90,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.lookback_floor == 0 {
            return Err(EngineError::InvalidConfiguration(
                "lookback_floor must be at least 1".to_string(),
            ));
        }
        if self.lookback_floor > self.lookback_ceiling {
            return Err(EngineError::InvalidConfiguration(format!(
                "lookback_floor ({}) must not exceed lookback_ceiling ({})",
                self.lookback_floor, self.lookback_ceiling
            )));
        }
        if self.initial_lookback < self.lookback_floor
            || self.initial_lookback > self.lookback_ceiling
        {
            return Err(EngineError::InvalidConfiguration(format!(
                "initial_lookback ({}) must lie within [{}, {}]",
                self.initial_lookback, self.lookback_floor, self.lookback_ceiling
            )));
        }
        check_fraction("initial_stop_risk", self.initial_stop_risk)?;
        check_fraction("trailing_stop_risk", self.trailing_stop_risk)?;
        Ok(())
    }
}

fn check_fraction(name: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfiguration(format!(
            "{} ({}) must lie within (0, 1]",
            name, value
        )))
    }
}
