//! Daily bar loading and the historical market data feed
//!
//! CSV layout: `date,open,high,low,close[,volume]` with a header row. Dates may be
//! `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339. Volume is accepted and ignored.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::market::MarketData;
use crate::{PriceBar, Symbol};

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn parse_price(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64> {
    record
        .get(idx)
        .with_context(|| format!("Missing {} column", name))?
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {}", name))
}

/// Load daily bars from a CSV file, oldest first.
///
/// Rows that parse but fail bar validation are skipped with a warning.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<PriceBar>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut bars = Vec::new();
    let mut skipped = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let date_str = record.get(0).context("Missing date column")?;
        let date = parse_date(date_str)
            .with_context(|| format!("Failed to parse date: {}", date_str))?;

        let open = parse_price(&record, 1, "open")?;
        let high = parse_price(&record, 2, "high")?;
        let low = parse_price(&record, 3, "low")?;
        let close = parse_price(&record, 4, "close")?;

        match PriceBar::new(date, open, high, low, close) {
            Ok(bar) => bars.push(bar),
            Err(e) => {
                warn!(row = row_idx + 1, %date, error = %e, "Skipping invalid bar");
                skipped += 1;
            }
        }
    }

    bars.sort_by_key(|b| b.date);
    info!(
        path = %path.display(),
        bars = bars.len(),
        skipped,
        "Loaded daily bars"
    );

    Ok(bars)
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed serves {served}, not {requested}")]
    UnknownSymbol { served: Symbol, requested: Symbol },

    #[error("feed has no bars")]
    Empty,
}

/// Replays a loaded bar series one session at a time.
///
/// The bar under the cursor is "today". The feed also stands in for the broker's
/// order book by tracking a single working stop order.
#[derive(Debug, Clone)]
pub struct HistoricalFeed {
    symbol: Symbol,
    bars: Vec<PriceBar>,
    cursor: usize,
    working_stop: Option<f64>,
}

impl HistoricalFeed {
    pub fn new(symbol: Symbol, bars: Vec<PriceBar>) -> Self {
        Self {
            symbol,
            bars,
            cursor: 0,
            working_stop: None,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move "today" to bar `index`, clamped to the last bar
    pub fn seek(&mut self, index: usize) {
        self.cursor = index.min(self.bars.len().saturating_sub(1));
    }

    /// Step to the next session. Returns false at the end of the series.
    pub fn advance(&mut self) -> bool {
        if self.cursor + 1 < self.bars.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    pub fn current_bar(&self) -> Option<&PriceBar> {
        self.bars.get(self.cursor)
    }

    pub fn working_stop(&self) -> Option<f64> {
        self.working_stop
    }

    pub fn place_stop(&mut self, stop_price: f64) {
        self.working_stop = Some(stop_price);
    }

    pub fn cancel_stop(&mut self) {
        self.working_stop = None;
    }

    fn check_symbol(&self, symbol: &Symbol) -> Result<(), FeedError> {
        if symbol == &self.symbol {
            Ok(())
        } else {
            Err(FeedError::UnknownSymbol {
                served: self.symbol.clone(),
                requested: symbol.clone(),
            })
        }
    }
}

impl MarketData for HistoricalFeed {
    type Error = FeedError;

    /// Up to `n_bars` bars ending at the cursor. Fewer are returned near the start
    /// of the series; the engine reports that as insufficient history.
    fn daily_history(&self, symbol: &Symbol, n_bars: usize) -> Result<Vec<PriceBar>, FeedError> {
        self.check_symbol(symbol)?;
        if self.bars.is_empty() {
            return Err(FeedError::Empty);
        }
        let end = self.cursor + 1;
        let start = end.saturating_sub(n_bars);
        Ok(self.bars[start..end].to_vec())
    }

    fn current_close(&self, symbol: &Symbol) -> Result<f64, FeedError> {
        self.check_symbol(symbol)?;
        self.current_bar().map(|b| b.close).ok_or(FeedError::Empty)
    }

    fn has_open_stop_order(&self, symbol: &Symbol) -> Result<bool, FeedError> {
        self.check_symbol(symbol)?;
        Ok(self.working_stop.is_some())
    }
}
