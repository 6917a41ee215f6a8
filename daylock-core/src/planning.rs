//! Planning — tags → pick → stop/targets → allocation → snapshot.
//!
//! Each symbol is planned independently (in parallel); a failure for one
//! symbol becomes an abstain plan with a machine-readable reason and never
//! affects the others.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::allocator::allocate;
use crate::classifier::{classify_day, TagConfig};
use crate::domain::{
    Bar, DaySummary, Direction, OpeningRange, OutcomeTable, Pick, PlanSnapshot, PlanStatus, SessionTags,
    TradePlan,
};
use crate::error::PlanError;
use crate::picker::{self, PickerConfig};
use crate::session::SessionConfig;
use crate::stops::{stop_targets, PriorLevels, StopConfig};

/// Read access to archived per-day bars. Implemented by the runner's adapters.
pub trait BarArchive: Send + Sync {
    /// All bars for `symbol` on `day`, or `None` if the archive has no such day.
    fn day_bars(&self, symbol: &str, day: NaiveDate) -> Option<Vec<Bar>>;
}

/// Walk back from `day` (exclusive) to the nearest day the archive has bars for.
pub fn find_prior_day(archive: &dyn BarArchive, symbol: &str, day: NaiveDate, max_lookback: u32) -> Option<DaySummary> {
    (1..=i64::from(max_lookback)).find_map(|back| {
        let candidate = day - Duration::days(back);
        archive
            .day_bars(symbol, candidate)
            .and_then(|bars| DaySummary::from_bars(&bars))
    })
}

/// Everything the planner needs to know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningConfig {
    pub session: SessionConfig,
    pub tags: TagConfig,
    pub picker: PickerConfig,
    pub stops: StopConfig,
    pub daily_risk_budget: f64,
    /// Added outward to the opening-range boundary to form the entry.
    pub entry_nudge: f64,
}

/// Inputs for one symbol's plan.
#[derive(Debug, Clone)]
pub struct SymbolInputs<'a> {
    pub symbol: String,
    /// Today's bars; anything closing after the plan cutoff is ignored.
    pub bars: Vec<Bar>,
    pub prior: Option<DaySummary>,
    pub history: &'a OutcomeTable,
}

/// Bars that had closed by the plan cutoff.
pub fn bars_at_cutoff(bars: &[Bar], day: NaiveDate, session: &SessionConfig) -> Vec<Bar> {
    let cutoff = day.and_time(session.plan_cutoff);
    bars.iter()
        .filter(|b| b.day() == day && session.bar_close(b.time) <= cutoff)
        .cloned()
        .collect()
}

pub fn opening_range(bars: &[Bar], session: &SessionConfig) -> Option<OpeningRange> {
    let window = session.opening_window(bars);
    if window.is_empty() {
        return None;
    }
    let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    Some(OpeningRange { high, low })
}

/// Plan one symbol. Abstain is a successful outcome; errors are for missing
/// data and rejected geometry.
pub fn plan_symbol(inputs: &SymbolInputs<'_>, day: NaiveDate, config: &PlanningConfig) -> Result<TradePlan, PlanError> {
    let missing = |what: &str| PlanError::DataMissing {
        symbol: inputs.symbol.clone(),
        day,
        what: what.to_string(),
    };

    let bars = bars_at_cutoff(&inputs.bars, day, &config.session);
    if bars.is_empty() {
        return Err(missing("no bars before plan cutoff"));
    }

    let tags = classify_day(&bars, inputs.prior.as_ref(), &config.session, &config.tags);
    let pick = picker::pick(&tags, inputs.history, day, &config.picker);
    if !pick.direction.is_directional() {
        let reason = pick.reason.clone();
        return Ok(TradePlan::abstain(&inputs.symbol, day, tags, pick, reason));
    }

    let range = opening_range(&bars, &config.session).ok_or_else(|| missing("opening range"))?;
    let entry = match pick.direction {
        Direction::Up => range.high + config.entry_nudge,
        _ => range.low - config.entry_nudge,
    };
    let prior = inputs.prior.map(|p| PriorLevels { high: p.high, low: p.low });

    let levels = stop_targets(tags.early_trend, pick.direction, &range, prior, entry, &config.stops).map_err(|source| {
        PlanError::BadGeometry {
            symbol: inputs.symbol.clone(),
            source,
        }
    })?;

    Ok(TradePlan {
        symbol: inputs.symbol.clone(),
        day,
        direction: pick.direction,
        tags,
        reason: pick.reason.clone(),
        pick,
        opening_range: Some(range),
        entry_price: entry,
        stop_price: levels.stop,
        target1: levels.target1,
        target2: levels.target2,
        risk_per_share: levels.risk_per_share,
        quantity: 0,
        per_trade_risk_used: 0.0,
    })
}

/// Plan every symbol, allocate the day's budget and freeze the result.
///
/// The returned snapshot is locked. Only `built_at` depends on the wall clock.
pub fn build_snapshot(
    day: NaiveDate,
    inputs: &[SymbolInputs<'_>],
    config: &PlanningConfig,
    config_hash: &str,
    built_at: NaiveDateTime,
) -> PlanSnapshot {
    let mut plans: Vec<TradePlan> = inputs
        .par_iter()
        .map(|input| {
            plan_symbol(input, day, config).unwrap_or_else(|err| {
                let reason = format!("{}: {err}", err.kind());
                TradePlan::abstain(&input.symbol, day, SessionTags::NEUTRAL, Pick::abstain(reason.clone()), reason)
            })
        })
        .collect();

    plans.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    plans.dedup_by(|a, b| a.symbol == b.symbol);

    let allocation = allocate(&mut plans, config.daily_risk_budget);
    let status = if allocation.demoted > 0 {
        PlanStatus::ReadyPartial
    } else {
        PlanStatus::Ready
    };

    PlanSnapshot {
        day,
        status,
        locked: true,
        built_at,
        config_hash: config_hash.to_string(),
        daily_risk_budget: config.daily_risk_budget,
        risk_per_trade: allocation.risk_per_trade,
        total_planned_risk: allocation.total_planned_risk,
        plans: plans.into_iter().map(|p| (p.symbol.clone(), p)).collect::<BTreeMap<_, _>>(),
    }
}
