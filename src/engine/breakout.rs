//! Breakout entry rule
//!
//! Entry: close reaches the highest high of the `lookback` bars before today.
//! Today's own high is left out of the threshold.

use crate::error::{EngineError, EngineResult};
use crate::indicators::highest;

/// Highest high over the `lookback` bars preceding the newest one.
///
/// `highs` is oldest first and must hold at least `lookback + 1` values; only the
/// newest `lookback + 1` are looked at.
pub fn breakout_threshold(highs: &[f64], lookback: usize) -> EngineResult<f64> {
    let required = lookback + 1;
    if lookback == 0 || highs.len() < required {
        return Err(EngineError::InsufficientHistory {
            required,
            actual: highs.len(),
        });
    }

    let start = highs.len() - required;
    let end = highs.len() - 1;
    let window = &highs[start..end];
    if let Some(bad) = window.iter().copied().find(|h| !h.is_finite()) {
        return Err(EngineError::InvalidPrice(bad));
    }

    highest(window).ok_or(EngineError::InsufficientHistory {
        required,
        actual: highs.len(),
    })
}

/// Inclusive breakout test: a close sitting exactly on the threshold counts.
pub fn is_breakout(close: f64, threshold: f64) -> bool {
    close >= threshold
}
