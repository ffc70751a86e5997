//! Daily replay harness
//!
//! Drives a [`BreakoutEngine`] across a [`HistoricalFeed`] the way a hosted runtime
//! would: fully invested on entry, one stop-market order working while invested,
//! stop fills at the worse of the stop and the open, everything marked to the close.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::BacktestConfig;
use crate::data::{FeedError, HistoricalFeed};
use crate::engine::{BreakoutEngine, EngineState, VOLATILITY_WINDOW};
use crate::error::{EngineError, EngineResult};
use crate::indicators::{mean, population_std_dev, rolling_std_dev};
use crate::{Decision, ExitReason, PerformanceMetrics, PriceBar, Trade};

/// One replayed session
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub date: NaiveDate,
    pub close: f64,
    /// Working stop after the session's decision was applied
    pub stop_price: Option<f64>,
    pub lookback: usize,
    pub equity: f64,
    #[serde(skip)]
    pub decision: Option<Decision>,
}

/// How often each decision came up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecisionCounts {
    pub no_action: usize,
    pub enter_long: usize,
    pub place_stop: usize,
    pub update_stop: usize,
    pub stop_unchanged: usize,
    pub errors: usize,
}

impl DecisionCounts {
    fn record(&mut self, decision: &Decision) {
        match decision {
            Decision::NoAction => self.no_action += 1,
            Decision::EnterLong { .. } => self.enter_long += 1,
            Decision::PlaceStop { .. } => self.place_stop += 1,
            Decision::UpdateStop { .. } => self.update_stop += 1,
            Decision::StopUnchanged => self.stop_unchanged += 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub sessions: Vec<SessionRecord>,
    pub counts: DecisionCounts,
    pub metrics: PerformanceMetrics,
    pub final_state: Option<EngineState>,
    pub last_decision: Option<Decision>,
}

impl BacktestResult {
    pub fn equity_curve(&self) -> Vec<(NaiveDate, f64)> {
        self.sessions.iter().map(|s| (s.date, s.equity)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenLot {
    entry_date: NaiveDate,
    entry_price: f64,
    quantity: f64,
    entry_commission: f64,
}

/// Sessions per year for annualising daily returns
const TRADING_DAYS: f64 = 252.0;

/// Replay engine
pub struct Replay {
    engine: BreakoutEngine,
    settings: BacktestConfig,
}

impl Replay {
    pub fn new(engine: BreakoutEngine, settings: BacktestConfig) -> Self {
        Replay { engine, settings }
    }

    pub fn engine(&self) -> &BreakoutEngine {
        &self.engine
    }

    /// Replay every bar of `feed` from the start
    pub fn run(&mut self, feed: &mut HistoricalFeed) -> EngineResult<BacktestResult> {
        if feed.symbol() != self.engine.symbol() {
            return Err(EngineError::market_data(FeedError::UnknownSymbol {
                served: feed.symbol().clone(),
                requested: self.engine.symbol().clone(),
            }));
        }
        if feed.is_empty() {
            warn!(symbol = %feed.symbol(), "No bars to replay");
            return Ok(BacktestResult::default());
        }

        let symbol = self.engine.symbol().clone();
        let warmup = self.engine.required_history() - 1;
        let mut cash = self.settings.initial_capital;
        let mut lot: Option<OpenLot> = None;
        let mut result = BacktestResult::default();

        info!(symbol = %symbol, sessions = feed.len(), warmup, "Replaying");
        feed.seek(0);
        feed.cancel_stop();

        loop {
            let Some(bar) = feed.current_bar().copied() else {
                break;
            };

            if let (Some(open), Some(stop)) = (lot, feed.working_stop()) {
                if bar.low <= stop {
                    let exit_price = bar.open.min(stop);
                    let trade = self.close_lot(&open, exit_price, bar.date, ExitReason::StopFilled);
                    cash += open.quantity * exit_price - (trade.commission - open.entry_commission);
                    info!(
                        symbol = %symbol,
                        date = %bar.date,
                        exit_price,
                        net_pnl = trade.net_pnl,
                        "Stop filled"
                    );
                    result.trades.push(trade);
                    lot = None;
                    feed.cancel_stop();
                    self.engine.on_position_closed();
                }
            }

            let mut decision = None;
            if feed.cursor() >= warmup {
                match self.engine.on_session_open(&*feed) {
                    Ok(d) => {
                        result.counts.record(&d);
                        self.apply(&d, &bar, feed, &mut cash, &mut lot);
                        decision = Some(d);
                    }
                    Err(e) => {
                        result.counts.errors += 1;
                        warn!(symbol = %symbol, date = %bar.date, error = %e, "Session skipped");
                    }
                }
            }

            let equity = cash + lot.map_or(0.0, |l| l.quantity * bar.close);
            result.sessions.push(SessionRecord {
                date: bar.date,
                close: bar.close,
                stop_price: feed.working_stop(),
                lookback: self.engine.lookback().current(),
                equity,
                decision,
            });
            if decision.is_some() {
                result.last_decision = decision;
            }

            if !feed.advance() {
                break;
            }
        }

        if let (Some(open), Some(last)) = (lot, feed.current_bar().copied()) {
            let trade = self.close_lot(&open, last.close, last.date, ExitReason::EndOfData);
            debug!(symbol = %symbol, net_pnl = trade.net_pnl, "Open position marked to final close");
            result.trades.push(trade);
        }

        result.metrics = performance_metrics(
            &result.trades,
            &result.equity_curve(),
            self.settings.initial_capital,
        );
        result.final_state = Some(*self.engine.state());
        Ok(result)
    }

    fn apply(
        &mut self,
        decision: &Decision,
        bar: &PriceBar,
        feed: &mut HistoricalFeed,
        cash: &mut f64,
        lot: &mut Option<OpenLot>,
    ) {
        match *decision {
            Decision::EnterLong { stop_price } => {
                if lot.is_some() {
                    // Keep the held lot and protect it at the engine's new level
                    warn!(date = %bar.date, "Entry while already holding, keeping existing lot");
                    feed.place_stop(stop_price);
                    return;
                }
                let entry_price = bar.close * (1.0 + self.settings.slippage);
                let quantity = *cash / (entry_price * (1.0 + self.settings.commission));
                if !(quantity > 0.0 && quantity.is_finite()) {
                    // Unfilled entry: the engine must not stay invested without a lot
                    warn!(date = %bar.date, cash = *cash, "No cash to enter, entry dropped");
                    feed.cancel_stop();
                    self.engine.on_position_closed();
                    return;
                }
                let entry_commission = quantity * entry_price * self.settings.commission;
                *cash -= quantity * entry_price + entry_commission;
                *lot = Some(OpenLot {
                    entry_date: bar.date,
                    entry_price,
                    quantity,
                    entry_commission,
                });
                feed.place_stop(stop_price);
            }
            Decision::PlaceStop { stop_price } => feed.place_stop(stop_price),
            Decision::UpdateStop { new_stop_price } => feed.place_stop(new_stop_price),
            Decision::NoAction | Decision::StopUnchanged => {}
        }
    }

    fn close_lot(
        &self,
        lot: &OpenLot,
        exit_price: f64,
        exit_date: NaiveDate,
        exit_reason: ExitReason,
    ) -> Trade {
        let pnl = (exit_price - lot.entry_price) * lot.quantity;
        let commission = lot.entry_commission + lot.quantity * exit_price * self.settings.commission;

        Trade {
            symbol: self.engine.symbol().clone(),
            entry_date: lot.entry_date,
            exit_date,
            entry_price: lot.entry_price,
            exit_price,
            quantity: lot.quantity,
            pnl,
            commission,
            net_pnl: pnl - commission,
            exit_reason,
        }
    }
}

fn performance_metrics(
    trades: &[Trade],
    equity_curve: &[(NaiveDate, f64)],
    initial_capital: f64,
) -> PerformanceMetrics {
    let Some(&(_, final_equity)) = equity_curve.last() else {
        return PerformanceMetrics::default();
    };

    let (wins, losses): (Vec<f64>, Vec<f64>) =
        trades.iter().map(|t| t.net_pnl).partition(|pnl| *pnl > 0.0);
    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().map(|pnl| pnl.abs()).sum();

    let profit_factor = match (gross_profit > 0.0, gross_loss > 0.0) {
        (_, true) => gross_profit / gross_loss,
        (true, false) => f64::INFINITY,
        (false, false) => 0.0,
    };
    let trade_returns: Vec<f64> = trades.iter().map(Trade::return_pct).collect();

    PerformanceMetrics {
        total_return: percent_change(initial_capital, final_equity),
        final_equity,
        sharpe_ratio: annualized_sharpe(equity_curve),
        max_drawdown: max_drawdown_pct(initial_capital, equity_curve),
        win_rate: share_pct(wins.len(), trades.len()),
        profit_factor,
        total_trades: trades.len(),
        winning_trades: wins.len(),
        losing_trades: losses.len(),
        avg_win: average(&wins),
        avg_loss: average(&losses).abs(),
        largest_win: wins.iter().copied().fold(0.0, f64::max),
        largest_loss: losses.iter().copied().fold(0.0, f64::min),
        avg_trade_return: average(&trade_returns),
        total_commission: trades.iter().map(|t| t.commission).sum(),
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        mean(values)
    }
}

fn percent_change(from: f64, to: f64) -> f64 {
    if from > 0.0 {
        (to - from) / from * 100.0
    } else {
        0.0
    }
}

fn share_pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Deepest peak-to-trough fall of the equity curve, percent
fn max_drawdown_pct(initial_capital: f64, equity_curve: &[(NaiveDate, f64)]) -> f64 {
    let (_, deepest) = equity_curve.iter().fold(
        (initial_capital, 0.0_f64),
        |(peak, deepest), &(_, equity)| {
            let peak = peak.max(equity);
            let drawdown = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };
            (peak, deepest.max(drawdown))
        },
    );
    deepest * 100.0
}

/// Annualised Sharpe of session-over-session equity returns, zero risk-free rate
fn annualized_sharpe(equity_curve: &[(NaiveDate, f64)]) -> f64 {
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0].1 > 0.0)
        .map(|w| w[1].1 / w[0].1 - 1.0)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }

    let spread = population_std_dev(&returns);
    if spread > 0.0 {
        mean(&returns) / spread * TRADING_DAYS.sqrt()
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
struct SeriesRow {
    date: NaiveDate,
    close: f64,
    stop_price: Option<f64>,
    lookback: usize,
    equity: f64,
    volatility: Option<f64>,
}

/// Write the daily close, stop, lookback, equity and 30-session volatility series
pub fn write_series_csv(path: impl AsRef<Path>, sessions: &[SessionRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let closes: Vec<f64> = sessions.iter().map(|s| s.close).collect();
    let volatility = rolling_std_dev(&closes, VOLATILITY_WINDOW);

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for (session, vol) in sessions.iter().zip(volatility) {
        writer.serialize(SeriesRow {
            date: session.date,
            close: session.close,
            stop_price: session.stop_price,
            lookback: session.lookback,
            equity: session.equity,
            volatility: vol,
        })?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = sessions.len(), "Wrote session series");
    Ok(())
}
