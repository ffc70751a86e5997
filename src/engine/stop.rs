//! Position state and trailing-stop management
//!
//! While invested the stop moves through two states. `NoStopSet` means no working
//! stop order exists, so one is placed at the position's current stop. `StopActive`
//! means the stop ratchets up to `close * trailing_stop_risk` whenever the close
//! makes a new high and that candidate clears the initial stop.
//!
//! A ratchet only ever raises the stop. Placing a lost stop again reuses the current
//! level, so the stop never drops below where it was.

use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use crate::types::Decision;

/// Levels tracked for an open long position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeldPosition {
    pub breakout_level: f64,
    pub highest_price: f64,
    pub stop_price: f64,
}

/// Engine-owned view of the position for its instrument
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PositionState {
    #[default]
    Flat,
    Invested(HeldPosition),
}

impl PositionState {
    pub fn is_invested(&self) -> bool {
        matches!(self, PositionState::Invested(_))
    }

    pub fn held(&self) -> Option<&HeldPosition> {
        match self {
            PositionState::Invested(pos) => Some(pos),
            PositionState::Flat => None,
        }
    }

    pub fn breakout_level(&self) -> Option<f64> {
        self.held().map(|p| p.breakout_level)
    }

    pub fn highest_price(&self) -> Option<f64> {
        self.held().map(|p| p.highest_price)
    }

    pub fn stop_price(&self) -> Option<f64> {
        self.held().map(|p| p.stop_price)
    }
}

/// Whether a protective stop order is working for an open position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopStatus {
    NoStopSet,
    StopActive { stop_price: f64, highest_price: f64 },
}

impl StopStatus {
    pub fn of(pos: &HeldPosition, has_open_stop_order: bool) -> Self {
        if has_open_stop_order {
            StopStatus::StopActive {
                stop_price: pos.stop_price,
                highest_price: pos.highest_price,
            }
        } else {
            StopStatus::NoStopSet
        }
    }
}

/// Initial and trailing stop rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopManager {
    initial_stop_risk: f64,
    trailing_stop_risk: f64,
}

impl StopManager {
    pub fn new(initial_stop_risk: f64, trailing_stop_risk: f64) -> Self {
        Self {
            initial_stop_risk,
            trailing_stop_risk,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.initial_stop_risk, config.trailing_stop_risk)
    }

    pub fn initial_stop(&self, breakout_level: f64) -> f64 {
        self.initial_stop_risk * breakout_level
    }

    /// Position opened on a breakout at `breakout_level`
    pub fn open(&self, breakout_level: f64) -> HeldPosition {
        HeldPosition {
            breakout_level,
            highest_price: breakout_level,
            stop_price: self.initial_stop(breakout_level),
        }
    }

    /// Raised position if `close` qualifies for a trailing update
    pub fn ratchet(&self, pos: &HeldPosition, close: f64) -> Option<HeldPosition> {
        let candidate = close * self.trailing_stop_risk;
        let new_high = close > pos.highest_price;
        let above_initial = self.initial_stop(pos.breakout_level) < candidate;

        if !(new_high && above_initial) {
            return None;
        }

        Some(HeldPosition {
            highest_price: close,
            stop_price: candidate,
            ..*pos
        })
    }

    /// One session of stop management for an open position
    pub fn step(
        &self,
        pos: &HeldPosition,
        close: f64,
        has_open_stop_order: bool,
    ) -> (HeldPosition, Decision) {
        let ratcheted = self.ratchet(pos, close);
        let next = ratcheted.unwrap_or(*pos);

        let decision = match StopStatus::of(&next, has_open_stop_order) {
            StopStatus::NoStopSet => Decision::PlaceStop {
                stop_price: next.stop_price,
            },
            StopStatus::StopActive { stop_price, .. } if ratcheted.is_some() => {
                Decision::UpdateStop {
                    new_stop_price: stop_price,
                }
            }
            StopStatus::StopActive { .. } => Decision::StopUnchanged,
        };

        (next, decision)
    }
}
