//! Decide command implementation
//!
//! Warms the engine over the whole data file, then reports what it decided for
//! the final session together with the state it carries into the next one.

use anyhow::{Context, Result};
use breakout_engine::backtest::Replay;
use breakout_engine::data::HistoricalFeed;
use serde_json::json;
use tracing::info;

pub fn run(config_path: String, symbol_override: Option<String>) -> Result<()> {
    let (config, bars) = super::load_inputs(&config_path, symbol_override)?;
    let session = bars.last().map(|b| b.date);

    let engine = super::build_engine(&config)?;
    let mut feed = HistoricalFeed::new(config.symbol(), bars);
    let mut replay = Replay::new(engine, config.backtest.clone());
    let result = replay.run(&mut feed).context("Replay failed")?;

    let decision = result.sessions.last().and_then(|s| s.decision);
    if decision.is_none() {
        info!("No decision for the final session (insufficient history or skipped)");
    }

    let report = json!({
        "symbol": config.instrument.symbol,
        "session": session,
        "decision": decision,
        "state": replay.engine().state(),
        "working_stop": feed.working_stop(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render decision")?
    );

    Ok(())
}
