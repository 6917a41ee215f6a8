//! Planner task: once the plan cutoff passes, build the day's snapshot from
//! the published bars and lock it into the shared document.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use daylock_core::domain::{is_weekday, Bar, OutcomeTable, PlanSnapshot};
use daylock_core::gate::{self, LockOutcome};
use daylock_core::planning::{build_snapshot, find_prior_day, BarArchive, SymbolInputs};

use crate::config::DaylockConfig;
use crate::outcomes::OutcomeStore;
use crate::store::{ApplyOutcome, MarketSection, SharedDocument, StatePatch};

use super::TaskContext;

pub const TASK_NAME: &str = "planner";

/// Plan every configured symbol for `day`. Bars, prior days and history
/// all come from the caller, so the same inputs always give the same plans.
pub fn build_day_snapshot(
    config: &DaylockConfig,
    archive: &dyn BarArchive,
    history: &BTreeMap<String, OutcomeTable>,
    day: NaiveDate,
    built_at: NaiveDateTime,
) -> PlanSnapshot {
    let blanks: Vec<OutcomeTable> = config.symbols.iter().map(OutcomeTable::new).collect();
    let inputs: Vec<SymbolInputs<'_>> = config
        .symbols
        .iter()
        .zip(&blanks)
        .map(|(symbol, blank)| SymbolInputs {
            symbol: symbol.clone(),
            bars: archive.day_bars(symbol, day).unwrap_or_default(),
            prior: find_prior_day(archive, symbol, day, config.tags.prior_day_max_lookback),
            history: history.get(symbol).unwrap_or(blank),
        })
        .collect();
    build_snapshot(day, &inputs, &config.planning(), &config.config_hash(), built_at)
}

/// Today's bars from the market section, older days from the archive.
struct MarketOverlay<'a> {
    day: NaiveDate,
    market: &'a MarketSection,
    archive: &'a dyn BarArchive,
}

impl BarArchive for MarketOverlay<'_> {
    fn day_bars(&self, symbol: &str, day: NaiveDate) -> Option<Vec<Bar>> {
        let published = self.market.symbol_bars(day, symbol);
        if day == self.day && !published.is_empty() {
            return Some(published.to_vec());
        }
        self.archive.day_bars(symbol, day)
    }
}

/// Symbols whose bar closing at the plan cutoff has not been published yet.
pub fn symbols_missing_cutoff(market: &MarketSection, day: NaiveDate, config: &DaylockConfig) -> Vec<String> {
    let cutoff = day.and_time(config.session.plan_cutoff);
    config
        .symbols
        .iter()
        .filter(|symbol| {
            market
                .symbol_bars(day, symbol)
                .last()
                .map_or(true, |b| config.session.bar_close(b.time) < cutoff)
        })
        .cloned()
        .collect()
}

pub struct Planner {
    ctx: TaskContext,
    archive: Arc<dyn BarArchive>,
    outcomes: Arc<OutcomeStore>,
}

impl Planner {
    pub fn new(ctx: TaskContext, archive: Arc<dyn BarArchive>, outcomes: Arc<OutcomeStore>) -> Self {
        Self { ctx, archive, outcomes }
    }

    pub fn step(&mut self, now: NaiveDateTime) -> anyhow::Result<String> {
        let day = now.date();
        if !is_weekday(day) {
            return Ok(format!("{day} is not a trading day"));
        }
        let config = &self.ctx.config;
        let cutoff = day.and_time(config.session.plan_cutoff);
        if now < cutoff {
            return Ok(format!("waiting for plan cutoff {}", config.session.plan_cutoff));
        }

        let doc = self.ctx.store.load()?;
        if let Some(snap) = doc.plan_for(day).filter(|s| s.locked) {
            return Ok(format!("plan locked for {day} ({:?})", snap.status));
        }

        let missing = symbols_missing_cutoff(&doc.market, day, config);
        if !missing.is_empty() {
            if now < cutoff + config.plan_grace() {
                return Ok(format!("waiting for cutoff bars: {}", missing.join(",")));
            }
            warn!(%day, symbols = %missing.join(","), "planning without cutoff bars");
        }

        let outcome = self.lock(&doc, day, now)?;
        let snap = outcome.snapshot();
        Ok(format!("plan locked for {day} ({:?})", snap.status))
    }

    /// Build and write the snapshot unless `day` is already locked.
    pub fn lock(&self, doc: &SharedDocument, day: NaiveDate, now: NaiveDateTime) -> anyhow::Result<LockOutcome> {
        let history = self.outcomes.load_all()?;
        let overlay = MarketOverlay {
            day,
            market: &doc.market,
            archive: self.archive.as_ref(),
        };
        let outcome = gate::lock_once(doc.plan_for(day), day, || {
            build_day_snapshot(&self.ctx.config, &overlay, &history, day, now)
        });

        if let LockOutcome::Built(snap) = &outcome {
            match self.ctx.store.apply(StatePatch::Plan(snap.clone()))? {
                ApplyOutcome::Applied => info!(
                    %day,
                    status = ?snap.status,
                    tradeable = snap.tradeable().count(),
                    risk_per_trade = snap.risk_per_trade,
                    hash = %snap.content_hash(),
                    "plan locked"
                ),
                ApplyOutcome::Ignored(why) => info!(%day, %why, "plan already written"),
            }
        }
        Ok(outcome)
    }
}
