//! Breakout Engine
//!
//! A single-instrument daily decision engine: a volatility-adaptive breakout
//! entry plus a ratcheting trailing stop. The engine itself does no I/O; market
//! data and order handling sit behind the [`market::MarketData`] trait and the
//! [`Decision`] values it returns.
//!
//! The crate also ships a CSV loader and a replay harness for running the engine
//! over historical daily bars.
//!
//! ```
//! use breakout_engine::engine::{BreakoutEngine, EngineConfig};
//! use breakout_engine::Symbol;
//!
//! let engine = BreakoutEngine::new(Symbol::new("SPY"), EngineConfig::default()).unwrap();
//! assert_eq!(engine.lookback().current(), 20);
//! assert_eq!(engine.required_history(), 31);
//! ```

pub mod backtest;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod market;
pub mod types;

pub use config::Config;
pub use engine::{BreakoutEngine, EngineConfig, SessionInputs};
pub use error::{EngineError, EngineResult};
pub use market::MarketData;
pub use types::*;
