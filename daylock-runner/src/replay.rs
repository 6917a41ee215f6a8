//! Synchronous single-day replay: plan at the cutoff, lock, then push every
//! archived bar through the execution engine and close out at EOD.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

use daylock_core::domain::{OutcomeTable, PlanSnapshot, Position};
use daylock_core::engine::{EngineEvent, ExecutionEngine};
use daylock_core::error::{ExecutionBlocked, TransitionError};
use daylock_core::gate;
use daylock_core::planning::BarArchive;
use daylock_core::risk::{RiskEngine, RiskState};

use crate::config::DaylockConfig;
use crate::tasks::planner::build_day_snapshot;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Blocked(#[from] ExecutionBlocked),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub day: NaiveDate,
    pub snapshot: PlanSnapshot,
    pub positions: Vec<Position>,
    pub risk: RiskState,
    pub events: Vec<EngineEvent>,
}

/// Options that change a replay without touching the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    /// Latch the manual kill before the first bar.
    pub killed: bool,
}

pub fn replay_day(
    config: &DaylockConfig,
    archive: &dyn BarArchive,
    history: &BTreeMap<String, OutcomeTable>,
    day: NaiveDate,
    options: ReplayOptions,
) -> Result<ReplaySummary, ReplayError> {
    let built_at = day.and_time(config.session.plan_cutoff);
    let snapshot = gate::lock_once(None, day, || build_day_snapshot(config, archive, history, day, built_at)).into_snapshot();

    let mut engine = ExecutionEngine::from_snapshot(
        Some(&snapshot),
        day,
        config.session.clone(),
        config.execution.clone(),
        RiskEngine::new(snapshot.daily_risk_budget),
    )?;
    if options.killed {
        engine.kill();
    }

    let mut bars: Vec<_> = config
        .symbols
        .iter()
        .filter_map(|symbol| archive.day_bars(symbol, day))
        .flatten()
        .collect();
    bars.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.symbol.cmp(&b.symbol)));

    let mut events = Vec::new();
    for bar in &bars {
        events.extend(engine.on_bar(bar)?);
    }
    events.extend(engine.on_clock(day.and_time(config.session.eod_cutoff))?);

    let risk = engine.risk_state();
    info!(
        %day,
        tradeable = snapshot.tradeable().count(),
        events = events.len(),
        day_total = risk.day_total,
        "replay finished"
    );
    Ok(ReplaySummary {
        day,
        positions: engine.into_positions(),
        snapshot,
        risk,
        events,
    })
}
