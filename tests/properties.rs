//! Property tests for the engine invariants

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use breakout_engine::engine::{LookbackState, PositionState, StopManager};
use breakout_engine::{BreakoutEngine, Decision, EngineConfig, PriceBar, SessionInputs, Symbol};

fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            PriceBar::new_unchecked(
                start + Duration::days(i as i64),
                close,
                close * 1.01,
                close * 0.99,
                close,
            )
        })
        .collect()
}

/// Random walk of positive closes, long enough for a full session
fn price_path(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.04f64..0.04, len).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|step| {
                price *= 1.0 + step;
                price
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn lookback_stays_within_bounds(
        floor in 1usize..20,
        span in 0usize..40,
        offset in 0usize..40,
        delta in -50.0f64..50.0,
    ) {
        let ceiling = floor + span;
        let current = floor + offset.min(span);
        let state = LookbackState::new(current, floor, ceiling).unwrap();

        let next = state.apply_delta(delta);
        prop_assert!(next.current() >= floor);
        prop_assert!(next.current() <= ceiling);
        prop_assert_eq!(next.floor(), floor);
        prop_assert_eq!(next.ceiling(), ceiling);
    }

    #[test]
    fn trailing_stop_never_falls(
        breakout in 10.0f64..500.0,
        closes in prop::collection::vec(0.5f64..3.0, 1..60),
        stop_flags in prop::collection::vec(any::<bool>(), 60),
    ) {
        let manager = StopManager::from_config(&EngineConfig::default());
        let mut pos = manager.open(breakout);
        let floor = manager.initial_stop(breakout);

        for (factor, has_stop) in closes.iter().zip(stop_flags.iter()) {
            let close = breakout * factor;
            let (next, decision) = manager.step(&pos, close, *has_stop);

            prop_assert!(next.stop_price >= pos.stop_price);
            prop_assert!(next.stop_price >= floor);
            prop_assert!(next.highest_price >= pos.highest_price);
            prop_assert_eq!(next.breakout_level, breakout);
            if let Some(stop) = decision.stop_price() {
                prop_assert_eq!(stop, next.stop_price);
            }
            pos = next;
        }
    }

    #[test]
    fn engine_never_enters_twice_while_invested(
        path in price_path(80),
        stop_flags in prop::collection::vec(any::<bool>(), 50),
    ) {
        let mut engine = BreakoutEngine::new(Symbol::new("SPY"), EngineConfig::default()).unwrap();
        let bars = bars_from_closes(&path);
        let window = engine.required_history();

        for (end, has_stop) in (window..=bars.len()).zip(stop_flags) {
            let history = &bars[end - window..end];
            let close = history[history.len() - 1].close;
            let was_invested = engine.position().is_invested();
            let before = *engine.state();

            match engine.decide(&SessionInputs {
                bars: history,
                close,
                has_open_stop_order: has_stop,
            }) {
                Ok(decision) => {
                    if was_invested {
                        prop_assert!(!decision.is_entry());
                        prop_assert!(engine.position().is_invested());
                    }
                    if decision.is_entry() {
                        prop_assert!(!was_invested);
                    }
                    if let Decision::NoAction = decision {
                        prop_assert_eq!(*engine.position(), PositionState::Flat);
                    }
                    let lookback = engine.lookback().current();
                    prop_assert!((10..=30).contains(&lookback));
                }
                Err(_) => prop_assert_eq!(*engine.state(), before),
            }
        }
    }

    #[test]
    fn evaluate_is_repeatable(path in price_path(31), close in 50.0f64..200.0) {
        let engine = BreakoutEngine::new(Symbol::new("SPY"), EngineConfig::default()).unwrap();
        let bars = bars_from_closes(&path);
        let inputs = SessionInputs {
            bars: &bars,
            close,
            has_open_stop_order: false,
        };

        let first = engine.evaluate(&inputs);
        let second = engine.evaluate(&inputs);
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "evaluate changed outcome between calls"),
        }
    }
}
