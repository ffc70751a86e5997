//! Market data collaborator interface
//!
//! The engine never fetches data or touches orders itself. Whatever runs it
//! (a broker adapter, the replay harness, a test double) implements [`MarketData`].

use crate::{PriceBar, Symbol};

pub trait MarketData {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The `n_bars` most recent daily bars, oldest first. The newest bar is the
    /// current session.
    fn daily_history(&self, symbol: &Symbol, n_bars: usize) -> Result<Vec<PriceBar>, Self::Error>;

    /// Latest price for the current session
    fn current_close(&self, symbol: &Symbol) -> Result<f64, Self::Error>;

    /// Whether a protective stop order is currently working for the instrument
    fn has_open_stop_order(&self, symbol: &Symbol) -> Result<bool, Self::Error>;
}
