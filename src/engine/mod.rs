//! Breakout decision engine
//!
//! One engine per instrument, called once per session:
//! 1. Adapt the lookback to the latest change in volatility.
//! 2. When flat, enter on a close at or above the highest high of the previous
//!    `lookback` bars.
//! 3. When invested, place or ratchet the protective stop.
//!
//! `evaluate` is pure. `decide` and `on_session_open` commit the resulting state
//! only when evaluation succeeds.

pub mod breakout;
pub mod config;
pub mod lookback;
pub mod stop;

pub use config::EngineConfig;
pub use lookback::{LookbackState, VolatilityChange, REQUIRED_CLOSES, VOLATILITY_WINDOW};
pub use stop::{HeldPosition, PositionState, StopManager, StopStatus};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::market::MarketData;
use crate::{Decision, PriceBar, Symbol};

/// Everything one session's decision depends on
#[derive(Debug, Clone, Copy)]
pub struct SessionInputs<'a> {
    /// Recent daily bars, oldest first, newest is the current session
    pub bars: &'a [PriceBar],
    pub close: f64,
    pub has_open_stop_order: bool,
}

/// State carried from one session to the next
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub lookback: LookbackState,
    pub position: PositionState,
}

/// Result of evaluating a session, before it is committed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOutcome {
    pub decision: Decision,
    pub state: EngineState,
    pub volatility: VolatilityChange,
    /// Breakout threshold, computed only while flat
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct BreakoutEngine {
    symbol: Symbol,
    config: EngineConfig,
    stops: StopManager,
    state: EngineState,
}

impl BreakoutEngine {
    pub fn new(symbol: Symbol, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let state = EngineState {
            lookback: LookbackState::from_config(&config)?,
            position: PositionState::Flat,
        };
        Ok(Self {
            symbol,
            stops: StopManager::from_config(&config),
            config,
            state,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn lookback(&self) -> &LookbackState {
        &self.state.lookback
    }

    pub fn position(&self) -> &PositionState {
        &self.state.position
    }

    /// Bars to request per session: the volatility windows or the widest breakout
    /// window plus today, whichever is longer
    pub fn required_history(&self) -> usize {
        REQUIRED_CLOSES.max(self.config.lookback_ceiling + 1)
    }

    /// Decide one session without changing the engine
    pub fn evaluate(&self, inputs: &SessionInputs<'_>) -> EngineResult<SessionOutcome> {
        if !inputs.close.is_finite() || inputs.close <= 0.0 {
            return Err(EngineError::InvalidPrice(inputs.close));
        }

        let closes: Vec<f64> = inputs.bars.iter().map(|b| b.close).collect();
        let (lookback, volatility) = self.state.lookback.adapt(&closes)?;
        debug!(
            symbol = %self.symbol,
            today_vol = volatility.today_vol,
            yesterday_vol = volatility.yesterday_vol,
            delta = volatility.delta,
            lookback = lookback.current(),
            "Lookback adapted"
        );

        let (position, decision, threshold) = match self.state.position {
            PositionState::Flat => {
                let highs: Vec<f64> = inputs.bars.iter().map(|b| b.high).collect();
                let threshold = breakout::breakout_threshold(&highs, lookback.current())?;
                debug!(symbol = %self.symbol, threshold, close = inputs.close, "Breakout check");

                if breakout::is_breakout(inputs.close, threshold) {
                    let held = self.stops.open(threshold);
                    (
                        PositionState::Invested(held),
                        Decision::EnterLong {
                            stop_price: held.stop_price,
                        },
                        Some(threshold),
                    )
                } else {
                    (PositionState::Flat, Decision::NoAction, Some(threshold))
                }
            }
            PositionState::Invested(held) => {
                let (next, decision) =
                    self.stops
                        .step(&held, inputs.close, inputs.has_open_stop_order);
                (PositionState::Invested(next), decision, None)
            }
        };

        Ok(SessionOutcome {
            decision,
            state: EngineState { lookback, position },
            volatility,
            threshold,
        })
    }

    /// Evaluate and commit one session from already-gathered inputs
    pub fn decide(&mut self, inputs: &SessionInputs<'_>) -> EngineResult<Decision> {
        let outcome = self.evaluate(inputs).inspect_err(|e| {
            warn!(symbol = %self.symbol, error = %e, "Session evaluation failed");
        })?;
        self.commit(&outcome);
        Ok(outcome.decision)
    }

    /// Pull this session's inputs from the collaborator and decide
    pub fn on_session_open<M: MarketData>(&mut self, market: &M) -> EngineResult<Decision> {
        let bars = market
            .daily_history(&self.symbol, self.required_history())
            .map_err(EngineError::market_data)?;
        let close = market
            .current_close(&self.symbol)
            .map_err(EngineError::market_data)?;
        let has_open_stop_order = market
            .has_open_stop_order(&self.symbol)
            .map_err(EngineError::market_data)?;

        self.decide(&SessionInputs {
            bars: &bars,
            close,
            has_open_stop_order,
        })
    }

    /// The position was closed outside the engine (stop filled)
    pub fn on_position_closed(&mut self) {
        if self.state.position.is_invested() {
            info!(symbol = %self.symbol, "Position closed, engine flat");
        }
        self.state.position = PositionState::Flat;
    }

    fn commit(&mut self, outcome: &SessionOutcome) {
        debug!(
            symbol = %self.symbol,
            decision = %outcome.decision,
            lookback = outcome.state.lookback.current(),
            "Session decided"
        );
        match outcome.decision {
            Decision::EnterLong { stop_price } => info!(
                symbol = %self.symbol,
                breakout_level = outcome.threshold.unwrap_or_default(),
                stop_price,
                "Breakout entry"
            ),
            Decision::PlaceStop { stop_price } => {
                info!(symbol = %self.symbol, stop_price, "Placing protective stop")
            }
            Decision::UpdateStop { new_stop_price } => {
                info!(symbol = %self.symbol, new_stop_price, "Trailing stop raised")
            }
            Decision::NoAction | Decision::StopUnchanged => {}
        }
        self.state = outcome.state;
    }
}
