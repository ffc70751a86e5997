//! Integration tests for the breakout engine
//!
//! These drive the engine through its public entry points, the way a runtime
//! would, and check the documented session scenarios end to end.

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use std::cell::Cell;
use std::io::Write;

use breakout_engine::backtest::Replay;
use breakout_engine::config::{BacktestConfig, Config};
use breakout_engine::data::{load_csv, HistoricalFeed};
use breakout_engine::engine::{HeldPosition, LookbackState, PositionState};
use breakout_engine::{
    BreakoutEngine, Decision, EngineConfig, EngineError, MarketData, PriceBar, SessionInputs,
    Symbol,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()
}

/// Bars whose closes alternate around `mid` (constant volatility) under a fixed high
fn quiet_bars(count: usize, mid: f64, high: f64) -> Vec<PriceBar> {
    (0..count)
        .map(|i| {
            let close = if i % 2 == 0 { mid + 1.0 } else { mid - 1.0 };
            PriceBar::new_unchecked(
                start_date() + Duration::days(i as i64),
                close,
                high,
                close - 1.0,
                close,
            )
        })
        .collect()
}

/// Trending series with a mild wobble, for longer replays
fn trending_bars(count: usize, base: f64, drift: f64) -> Vec<PriceBar> {
    (0..count)
        .map(|i| {
            let wobble = match i % 3 {
                0 => 1.5,
                1 => -1.0,
                _ => 0.4,
            };
            let close = base + i as f64 * drift + wobble;
            PriceBar::new_unchecked(
                start_date() + Duration::days(i as i64),
                close - 0.3,
                close + 1.0,
                close - 1.0,
                close,
            )
        })
        .collect()
}

fn engine() -> BreakoutEngine {
    BreakoutEngine::new(Symbol::new("SPY"), EngineConfig::default()).unwrap()
}

/// Collaborator double that counts history requests
struct ScriptedMarket {
    bars: Vec<PriceBar>,
    close: f64,
    stop_open: bool,
    requested: Cell<usize>,
}

#[derive(Debug, thiserror::Error)]
#[error("feed offline")]
struct Offline;

impl MarketData for ScriptedMarket {
    type Error = Offline;

    fn daily_history(&self, _symbol: &Symbol, n_bars: usize) -> Result<Vec<PriceBar>, Offline> {
        self.requested.set(n_bars);
        let start = self.bars.len().saturating_sub(n_bars);
        Ok(self.bars[start..].to_vec())
    }

    fn current_close(&self, _symbol: &Symbol) -> Result<f64, Offline> {
        Ok(self.close)
    }

    fn has_open_stop_order(&self, _symbol: &Symbol) -> Result<bool, Offline> {
        Ok(self.stop_open)
    }
}

struct OfflineMarket;

impl MarketData for OfflineMarket {
    type Error = Offline;

    fn daily_history(&self, _: &Symbol, _: usize) -> Result<Vec<PriceBar>, Offline> {
        Err(Offline)
    }

    fn current_close(&self, _: &Symbol) -> Result<f64, Offline> {
        Err(Offline)
    }

    fn has_open_stop_order(&self, _: &Symbol) -> Result<bool, Offline> {
        Err(Offline)
    }
}

// =============================================================================
// Session scenarios
// =============================================================================

#[test]
fn test_rising_volatility_stretches_lookback_to_ceiling() {
    let state = LookbackState::new(20, 10, 30).unwrap();
    let delta = (2.0 - 1.0) / 2.0;
    assert_eq!(state.apply_delta(delta).current(), 30);
}

#[test]
fn test_volatility_doubling_through_adapter_and_engine() {
    // 30 closes alternating 100.1 / 99.9, then a jump to 101.0
    let mut closes: Vec<f64> = (0..30)
        .map(|i| if i % 2 == 0 { 100.1 } else { 99.9 })
        .collect();
    closes.push(101.0);

    let state = LookbackState::new(20, 10, 30).unwrap();
    let (next, change) = state.adapt(&closes).unwrap();
    let ratio = change.today_vol / change.yesterday_vol;
    assert!(ratio > 1.95 && ratio < 2.15, "ratio {}", ratio);
    assert_relative_eq!(change.delta, (ratio - 1.0) / ratio, epsilon = 1e-12);
    assert_eq!(next.current(), 30);

    let bars: Vec<PriceBar> = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            PriceBar::new_unchecked(start_date() + Duration::days(i as i64), c, c + 0.2, c - 0.2, c)
        })
        .collect();
    let mut engine = engine();
    let decision = engine
        .decide(&SessionInputs {
            bars: &bars,
            close: 101.0,
            has_open_stop_order: false,
        })
        .unwrap();

    assert_eq!(engine.lookback().current(), 30);
    // Widened window still tops out at 100.3, so 101.0 breaks out
    assert!(decision.is_entry());
    assert_eq!(engine.position().breakout_level(), Some(100.1 + 0.2));
}

#[test]
fn test_breakout_entry_from_flat() {
    let mut engine = engine();
    let bars = quiet_bars(31, 90.0, 100.0);

    let decision = engine
        .decide(&SessionInputs {
            bars: &bars,
            close: 101.0,
            has_open_stop_order: false,
        })
        .unwrap();

    match decision {
        Decision::EnterLong { stop_price } => assert_relative_eq!(stop_price, 98.0, epsilon = 1e-9),
        other => panic!("expected EnterLong, got {:?}", other),
    }
    let position = engine.position();
    assert!(position.is_invested());
    assert_eq!(position.breakout_level(), Some(100.0));
    assert_eq!(position.highest_price(), Some(100.0));
}

#[test]
fn test_trailing_candidate_below_initial_stop_is_unchanged() {
    let mut engine = engine();
    let bars = quiet_bars(31, 90.0, 100.0);
    engine
        .decide(&SessionInputs {
            bars: &bars,
            close: 101.0,
            has_open_stop_order: false,
        })
        .unwrap();

    let decision = engine
        .decide(&SessionInputs {
            bars: &bars,
            close: 105.0,
            has_open_stop_order: true,
        })
        .unwrap();
    assert_eq!(decision, Decision::StopUnchanged);
    assert_eq!(engine.position().highest_price(), Some(100.0));
}

#[test]
fn test_trailing_stop_ratchets_on_new_high() {
    // Breakout at 90 with the high already at 100
    let manager = breakout_engine::engine::StopManager::from_config(&EngineConfig::default());
    let held = HeldPosition {
        breakout_level: 90.0,
        highest_price: 100.0,
        stop_price: manager.initial_stop(90.0),
    };
    assert_relative_eq!(held.stop_price, 88.2, epsilon = 1e-9);

    let (next, decision) = manager.step(&held, 110.0, true);
    match decision {
        Decision::UpdateStop { new_stop_price } => {
            assert_relative_eq!(new_stop_price, 99.0, epsilon = 1e-9)
        }
        other => panic!("expected UpdateStop, got {:?}", other),
    }
    assert_eq!(next.highest_price, 110.0);
    assert_eq!(PositionState::Invested(next).stop_price(), Some(next.stop_price));
}

#[test]
fn test_flat_prices_are_degenerate_and_leave_state_alone() {
    let mut engine = engine();
    let bars: Vec<PriceBar> = (0..31)
        .map(|i| {
            PriceBar::new_unchecked(
                start_date() + Duration::days(i),
                100.0,
                100.0,
                100.0,
                100.0,
            )
        })
        .collect();
    let before = *engine.state();

    let err = engine
        .decide(&SessionInputs {
            bars: &bars,
            close: 100.0,
            has_open_stop_order: false,
        })
        .unwrap_err();

    assert!(matches!(err, EngineError::DegenerateVolatility { .. }));
    assert_eq!(*engine.state(), before);
    assert_eq!(engine.lookback().current(), 20);
}

// =============================================================================
// Entry point and collaborator
// =============================================================================

#[test]
fn test_on_session_open_requests_required_history() {
    let mut engine = engine();
    let market = ScriptedMarket {
        bars: quiet_bars(60, 90.0, 100.0),
        close: 95.0,
        stop_open: false,
        requested: Cell::new(0),
    };

    let decision = engine.on_session_open(&market).unwrap();
    assert_eq!(decision, Decision::NoAction);
    assert_eq!(market.requested.get(), engine.required_history());
}

#[test]
fn test_on_session_open_wraps_collaborator_errors() {
    let mut engine = engine();
    let err = engine.on_session_open(&OfflineMarket).unwrap_err();
    assert!(matches!(err, EngineError::MarketData(_)));
    assert_eq!(err.to_string(), "market data unavailable: feed offline");
}

#[test]
fn test_short_history_is_insufficient() {
    let mut engine = engine();
    let market = ScriptedMarket {
        bars: quiet_bars(12, 90.0, 100.0),
        close: 150.0,
        stop_open: false,
        requested: Cell::new(0),
    };
    let err = engine.on_session_open(&market).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientHistory {
            required: 31,
            actual: 12
        }
    ));
}

#[test]
fn test_lost_stop_is_replaced_at_ratcheted_level() {
    let mut engine = engine();
    let bars = quiet_bars(31, 90.0, 100.0);
    let session = |close, stop_open| SessionInputs {
        bars: &bars,
        close,
        has_open_stop_order: stop_open,
    };

    engine.decide(&session(101.0, false)).unwrap();
    let raised = engine.decide(&session(120.0, true)).unwrap();
    assert!(matches!(raised, Decision::UpdateStop { .. }));

    // Stop order vanished: re-place it where it was, not at the initial level
    let replaced = engine.decide(&session(115.0, false)).unwrap();
    assert_eq!(replaced.stop_price(), raised.stop_price());
}

#[test]
fn test_no_reentry_until_position_closed() {
    let mut engine = engine();
    let bars = quiet_bars(31, 90.0, 100.0);
    let session = SessionInputs {
        bars: &bars,
        close: 130.0,
        has_open_stop_order: true,
    };

    assert!(engine.decide(&session).unwrap().is_entry());
    for _ in 0..3 {
        assert!(!engine.decide(&session).unwrap().is_entry());
    }

    engine.on_position_closed();
    assert!(engine.decide(&session).unwrap().is_entry());
}

#[test]
fn test_same_state_and_inputs_give_same_decision() {
    let mut engine = engine();
    let bars = quiet_bars(31, 90.0, 100.0);
    engine
        .decide(&SessionInputs {
            bars: &bars,
            close: 101.0,
            has_open_stop_order: false,
        })
        .unwrap();

    let inputs = SessionInputs {
        bars: &bars,
        close: 112.0,
        has_open_stop_order: true,
    };
    let mut first = engine.clone();
    let mut second = engine.clone();

    assert_eq!(first.decide(&inputs).unwrap(), second.decide(&inputs).unwrap());
    assert_eq!(first.state(), second.state());
}

// =============================================================================
// Replay over files
// =============================================================================

#[test]
fn test_replay_from_csv_and_config() {
    let dir = tempfile::tempdir().unwrap();

    let mut csv = std::fs::File::create(dir.path().join("SPY_1d.csv")).unwrap();
    writeln!(csv, "date,open,high,low,close,volume").unwrap();
    for bar in trending_bars(120, 100.0, 0.5) {
        writeln!(
            csv,
            "{},{},{},{},{},1000",
            bar.date, bar.open, bar.high, bar.low, bar.close
        )
        .unwrap();
    }
    drop(csv);

    let config_path = dir.path().join("config.json");
    std::fs::write(
        &config_path,
        serde_json::json!({
            "instrument": { "symbol": "SPY" },
            "backtest": { "data_dir": dir.path().to_str().unwrap() }
        })
        .to_string(),
    )
    .unwrap();

    let config = Config::from_file(&config_path).unwrap();
    let bars = load_csv(config.data_file()).unwrap();
    assert_eq!(bars.len(), 120);

    let engine = BreakoutEngine::new(config.symbol(), config.engine.clone()).unwrap();
    let mut feed = HistoricalFeed::new(config.symbol(), bars);
    let mut replay = Replay::new(engine, config.backtest.clone());
    let result = replay.run(&mut feed).unwrap();

    assert_eq!(result.sessions.len(), 120);
    assert!(result.counts.enter_long >= 1);
    assert!(result.last_decision.is_some());
    for session in &result.sessions {
        assert!((10..=30).contains(&session.lookback));
    }
}

#[test]
fn test_replay_commission_reduces_equity() {
    let bars = trending_bars(90, 100.0, 0.8);

    let run = |commission: f64| {
        let mut feed = HistoricalFeed::new(Symbol::new("SPY"), bars.clone());
        let settings = BacktestConfig {
            commission,
            ..Default::default()
        };
        Replay::new(engine(), settings).run(&mut feed).unwrap()
    };

    let free = run(0.0);
    let costly = run(0.01);
    assert!(free.metrics.total_trades >= 1);
    assert!(costly.metrics.final_equity < free.metrics.final_equity);
    assert!(costly.metrics.total_commission > 0.0);
}
