//! Engine error types

use thiserror::Error;

/// Boxed collaborator error
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything a session decision can fail with.
///
/// The engine leaves its state untouched whenever one of these is returned.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient history: need {required} bars, got {actual}")]
    InsufficientHistory { required: usize, actual: usize },

    #[error("degenerate volatility: today's volatility is {today_vol}, relative change is undefined")]
    DegenerateVolatility { today_vol: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid price: {0}")]
    InvalidPrice(f64),

    #[error("market data unavailable: {0}")]
    MarketData(#[source] SourceError),
}

impl EngineError {
    pub fn market_data<E>(err: E) -> Self
    where
        E: Into<SourceError>,
    {
        Self::MarketData(err.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
