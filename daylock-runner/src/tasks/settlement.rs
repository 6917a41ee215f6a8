//! Settlement task: after the close, archive the day's bars, label each
//! symbol's outcome, journal closed positions and record the settlement.
//!
//! Every write here is keyed by (symbol, day), so re-running a settlement
//! after a crash appends nothing twice.

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tracing::{debug, info, warn};

use daylock_core::domain::{is_weekday, SessionTags};
use daylock_core::planning::find_prior_day;

use crate::archive::DayArchive;
use crate::outcomes::{label_day, JournalRecord, OutcomeRecord, OutcomeStore, TradeJournal};
use crate::store::{SettlementSection, SharedDocument, StatePatch};

use super::TaskContext;

pub const TASK_NAME: &str = "settlement";

pub struct Settlement<A> {
    ctx: TaskContext,
    archive: Arc<A>,
    outcomes: Arc<OutcomeStore>,
    journal: Arc<TradeJournal>,
}

impl<A: DayArchive> Settlement<A> {
    pub fn new(ctx: TaskContext, archive: Arc<A>, outcomes: Arc<OutcomeStore>, journal: Arc<TradeJournal>) -> Self {
        Self {
            ctx,
            archive,
            outcomes,
            journal,
        }
    }

    pub fn step(&mut self, now: NaiveDateTime) -> anyhow::Result<String> {
        let day = now.date();
        if !is_weekday(day) {
            return Ok(format!("{day} is not a trading day"));
        }
        if now < day.and_time(self.ctx.config.session.settlement_time) {
            return Ok(format!("waiting for {}", self.ctx.config.session.settlement_time));
        }
        let doc = self.ctx.store.load()?;
        if doc.settlement.as_ref().is_some_and(|s| s.day == day) {
            return Ok(format!("settled {day}"));
        }
        let section = self.settle(&doc, day, now)?;
        Ok(format!(
            "settled {day}: {} outcomes, {} journal records",
            section.outcomes_appended, section.journal_records
        ))
    }

    pub fn settle(&self, doc: &SharedDocument, day: NaiveDate, now: NaiveDateTime) -> anyhow::Result<SettlementSection> {
        let config = &self.ctx.config;
        let archive = self.archive.as_ref();

        let mut outcome_records = Vec::new();
        for symbol in &config.symbols {
            let published = doc.market.symbol_bars(day, symbol);
            let bars = match archive.day_bars(symbol, day) {
                Some(bars) => bars,
                None if !published.is_empty() => {
                    archive.store_day(symbol, day, published)?;
                    published.to_vec()
                }
                None => {
                    debug!(%symbol, %day, "no bars to label");
                    continue;
                }
            };
            let prior = find_prior_day(archive, symbol, day, config.tags.prior_day_max_lookback);
            let labelled = label_day(
                &bars,
                prior.as_ref(),
                &config.session,
                &config.tags,
                config.runner.outcome_threshold_pct,
            );
            if let Some(row) = labelled {
                outcome_records.push(OutcomeRecord {
                    symbol: symbol.clone(),
                    row,
                });
            }
        }
        let outcomes_appended = self.outcomes.append(outcome_records)?;

        let positions: Vec<_> = if doc.execution.day == Some(day) {
            doc.execution.positions.iter().collect()
        } else {
            Vec::new()
        };
        let still_open: Vec<&str> = positions
            .iter()
            .filter(|p| !p.is_closed())
            .map(|p| p.symbol.as_str())
            .collect();
        if !still_open.is_empty() {
            warn!(%day, symbols = %still_open.join(","), "positions not closed at settlement");
        }

        let plans = doc.plan_for(day).map(|s| &s.plans);
        let journal_records = positions
            .iter()
            .filter(|p| p.is_closed())
            .map(|p| {
                let plan = plans.and_then(|plans| plans.get(&p.symbol));
                JournalRecord::from_position(
                    p,
                    plan.map_or(SessionTags::NEUTRAL, |plan| plan.tags),
                    plan.map_or("", |plan| plan.reason.as_str()),
                )
            })
            .collect();
        let journaled = self.journal.append(journal_records)?;

        let section = SettlementSection {
            day,
            settled_at: now,
            outcomes_appended,
            journal_records: journaled,
            realized_total: positions.iter().map(|p| p.realized_pnl).sum(),
        };
        self.ctx.store.apply(StatePatch::Settlement(section.clone()))?;
        info!(
            %day,
            outcomes = outcomes_appended,
            journaled,
            realized = section.realized_total,
            "day settled"
        );
        Ok(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::clock::{ManualClock, StopSignal};
    use crate::fixtures::{at, bar, config, day, drift, locked_snapshot, morning};
    use crate::store::{DocumentStore, ExecutionSection, ExecutionStatus, MemoryStore};
    use chrono::Duration;
    use daylock_core::domain::{Bar, ExitReason, Outcome, Position};
    use daylock_core::planning::BarArchive;

    struct Harness {
        settlement: Settlement<MemoryArchive>,
        store: Arc<MemoryStore>,
        archive: Arc<MemoryArchive>,
        outcomes: Arc<OutcomeStore>,
        journal: Arc<TradeJournal>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let archive = Arc::new(MemoryArchive::new());
        let outcomes = Arc::new(OutcomeStore::new(dir.path().join("outcomes.jsonl")));
        let journal = Arc::new(TradeJournal::new(dir.path().join("journal.jsonl")));
        let ctx = TaskContext {
            config: Arc::new(config(&["INFY"])),
            store: store.clone(),
            clock: Arc::new(ManualClock::new(at(15, 0))),
            stop: StopSignal::new(),
        };
        Harness {
            settlement: Settlement::new(ctx, archive.clone(), outcomes.clone(), journal.clone()),
            store,
            archive,
            outcomes,
            journal,
            _dir: dir,
        }
    }

    /// A full rising day that closed 2% above its open.
    fn full_day() -> Vec<Bar> {
        let mut bars = morning("INFY");
        bars.extend(drift("INFY", 5, 72));
        bars.push(bar("INFY", 73, 101.0, 102.1, 100.9, 102.0));
        bars
    }

    fn closed_position() -> Position {
        let snap = locked_snapshot(&config(&["INFY"]));
        let mut pos = Position::from_plan(&snap.plans["INFY"], 4).unwrap();
        pos.state = daylock_core::domain::PositionState::Closed;
        pos.exit_reason = Some(ExitReason::NoFill);
        pos.entry_price = Some(pos.plan_entry);
        pos
    }

    #[test]
    fn settles_once_after_settlement_time() {
        let mut h = harness();
        let snap = locked_snapshot(&config(&["INFY"]));
        h.store.apply(StatePatch::Plan(snap)).unwrap();
        h.store.apply(StatePatch::MarketBars { day: day(), bars: full_day() }).unwrap();
        h.store
            .apply(StatePatch::Execution(ExecutionSection {
                day: Some(day()),
                status: ExecutionStatus::FlatForDay,
                positions: vec![closed_position()],
                ..ExecutionSection::default()
            }))
            .unwrap();

        h.settlement.step(at(15, 34)).unwrap();
        assert!(h.store.load().unwrap().settlement.is_none());

        h.settlement.step(at(15, 35)).unwrap();
        let settled = h.store.load().unwrap().settlement.unwrap();
        assert_eq!(settled.day, day());
        assert_eq!(settled.outcomes_appended, 1);
        assert_eq!(settled.journal_records, 1);

        let table = h.outcomes.load_table("INFY").unwrap();
        assert_eq!(table.rows()[0].outcome, Outcome::Up);
        let journal = h.journal.read_all().unwrap();
        assert_eq!(journal[0].exit_reason, Some(ExitReason::NoFill));
        assert!(journal[0].plan_reason.starts_with("level=EXACT3"));
        assert_eq!(h.archive.day_bars("INFY", day()).unwrap().len(), 74);

        h.settlement.step(at(15, 40)).unwrap();
        assert_eq!(h.outcomes.load_table("INFY").unwrap().len(), 1);
        assert_eq!(h.journal.read_all().unwrap().len(), 1);
    }

    #[test]
    fn rerun_after_crash_appends_nothing_twice() {
        let h = harness();
        h.store.apply(StatePatch::MarketBars { day: day(), bars: full_day() }).unwrap();
        let doc = h.store.load().unwrap();
        h.settlement.settle(&doc, day(), at(15, 35)).unwrap();
        let again = h.settlement.settle(&doc, day(), at(15, 36)).unwrap();
        assert_eq!(again.outcomes_appended, 0);
        assert_eq!(again.journal_records, 0);
    }

    #[test]
    fn prior_day_comes_from_archive() {
        let h = harness();
        let friday = day() - Duration::days(3);
        h.archive.insert(full_day().into_iter().map(|mut b| {
            b.time -= Duration::days(3);
            b
        }));
        h.store.apply(StatePatch::MarketBars { day: day(), bars: full_day() }).unwrap();
        let doc = h.store.load().unwrap();
        h.settlement.settle(&doc, day(), at(15, 35)).unwrap();

        let table = h.outcomes.load_table("INFY").unwrap();
        let row = &table.rows()[0];
        assert_eq!(row.day, day());
        assert!(h.archive.day_bars("INFY", friday).is_some());
        assert_ne!(row.tags.open_location, daylock_core::domain::OpenLocation::Unknown);
    }
}
