//! Simulator task: paper-executes the locked plan against published bars.
//!
//! Never starts an engine without a locked snapshot for today. While the
//! plan is missing it reports WAITING_FOR_PLAN, then EXECUTION_BLOCKED once
//! the wait budget is spent, and keeps retrying either way.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use daylock_core::domain::is_weekday;
use daylock_core::engine::{EngineEvent, EventKind, ExecutionEngine};
use daylock_core::error::{ExecutionBlocked, TransitionError};
use daylock_core::risk::{RiskEngine, RiskState};

use crate::store::{ExecutionSection, ExecutionStatus, SharedDocument, StatePatch};

use super::TaskContext;

pub const TASK_NAME: &str = "simulator";

pub struct Simulator {
    ctx: TaskContext,
    engine: Option<ExecutionEngine>,
    waiting_since: Option<NaiveDateTime>,
}

impl Simulator {
    pub fn new(ctx: TaskContext) -> Self {
        Self {
            ctx,
            engine: None,
            waiting_since: None,
        }
    }

    pub fn step(&mut self, now: NaiveDateTime) -> anyhow::Result<String> {
        let day = now.date();
        if let Some(old) = self.engine.as_ref().map(ExecutionEngine::day).filter(|d| *d != day) {
            info!(day = %old, "day rolled over, engine released");
            self.engine = None;
        }
        if self.waiting_since.is_some_and(|t| t.date() != day) {
            self.waiting_since = None;
        }
        if !is_weekday(day) || now < day.and_time(self.ctx.config.session.plan_cutoff) {
            return Ok("idle".into());
        }

        let doc = self.ctx.store.load()?;
        let mut engine = match self.engine.take() {
            Some(engine) => engine,
            None => match self.start(&doc, day) {
                Ok(engine) => engine,
                Err(blocked) => return self.wait(&doc, now, blocked),
            },
        };

        let advanced = advance(&mut engine, &doc, now);
        let section = self.section(&engine, now);
        self.engine = Some(engine);
        for event in advanced? {
            log_event(&event);
        }

        let note = format!(
            "{:?}: day_total={:.2} can_open={}",
            section.status, section.risk.day_total, section.risk.can_open_new_trades
        );
        if section != doc.execution {
            if section.status == ExecutionStatus::FlatForDay && doc.execution.status != ExecutionStatus::FlatForDay {
                info!(%day, realized = section.risk.realized_total, "flat for the day");
            }
            self.ctx.store.apply(StatePatch::Execution(section))?;
        }
        Ok(note)
    }

    fn start(&mut self, doc: &SharedDocument, day: NaiveDate) -> Result<ExecutionEngine, ExecutionBlocked> {
        let config = &self.ctx.config;
        let snapshot = doc.plan_for(day);
        let budget = snapshot.map_or(config.risk.daily_risk_budget, |s| s.daily_risk_budget);
        let mut engine = ExecutionEngine::from_snapshot(
            snapshot,
            day,
            config.session.clone(),
            config.execution.clone(),
            RiskEngine::new(budget),
        )?;

        if doc.execution.day == Some(day) && !doc.execution.positions.is_empty() {
            engine = engine.restore(doc.execution.positions.clone(), doc.execution.last_bar_times.clone());
            info!(%day, symbols = doc.execution.last_bar_times.len(), last_bar = ?doc.execution.last_bar_time, "execution restored");
        }
        info!(%day, positions = engine.positions().count(), "execution started");
        self.waiting_since = None;
        Ok(engine)
    }

    fn wait(&mut self, doc: &SharedDocument, now: NaiveDateTime, blocked: ExecutionBlocked) -> anyhow::Result<String> {
        let since = *self.waiting_since.get_or_insert(now);
        let status = if now - since >= self.ctx.config.plan_wait_budget() {
            ExecutionStatus::ExecutionBlocked
        } else {
            ExecutionStatus::WaitingForPlan
        };
        if status == ExecutionStatus::ExecutionBlocked && doc.execution.status != status {
            warn!(day = %blocked.day, reason = %blocked.reason, "execution blocked, still retrying");
        }

        let same_day = doc.execution.day == Some(blocked.day);
        let section = ExecutionSection {
            day: Some(blocked.day),
            status,
            reason: Some(blocked.to_string()),
            positions: if same_day { doc.execution.positions.clone() } else { Vec::new() },
            risk: if same_day { doc.execution.risk } else { RiskState::default() },
            last_bar_time: doc.execution.last_bar_time.filter(|_| same_day),
            last_bar_times: if same_day { doc.execution.last_bar_times.clone() } else { BTreeMap::new() },
        };
        if section != doc.execution {
            self.ctx.store.apply(StatePatch::Execution(section))?;
        }
        Ok(format!("{status:?}: {}", blocked.reason))
    }

    fn section(&self, engine: &ExecutionEngine, now: NaiveDateTime) -> ExecutionSection {
        let day = engine.day();
        let past_eod = now >= day.and_time(self.ctx.config.session.eod_cutoff);
        let status = if engine.is_flat() && (past_eod || engine.positions().next().is_some()) {
            ExecutionStatus::FlatForDay
        } else {
            ExecutionStatus::Running
        };
        ExecutionSection {
            day: Some(day),
            status,
            reason: None,
            positions: engine.positions().cloned().collect(),
            risk: engine.risk_state(),
            last_bar_time: engine.last_bar_time(),
            last_bar_times: engine.last_bar_times().clone(),
        }
    }
}

/// Latch a requested kill, apply every unseen bar, then the clock.
fn advance(engine: &mut ExecutionEngine, doc: &SharedDocument, now: NaiveDateTime) -> Result<Vec<EngineEvent>, TransitionError> {
    let day = engine.day();
    if doc.kill_active(day) && !engine.risk_state().manual_kill {
        engine.kill();
        warn!(%day, "manual kill latched, no new entries today");
    }
    let mut events = Vec::new();
    for bar in doc.market.bars_in_time_order(day) {
        events.extend(engine.on_bar(&bar)?);
    }
    events.extend(engine.on_clock(now)?);
    Ok(events)
}

fn log_event(event: &EngineEvent) {
    let symbol = event.symbol.as_str();
    match &event.kind {
        EventKind::Filled { price, bar } => info!(%symbol, price, bar, "filled"),
        EventKind::Closed { reason, price, pnl } => info!(%symbol, ?reason, price, pnl, "closed"),
        EventKind::EntryDenied { bar } => warn!(%symbol, bar, "entry denied by risk engine"),
        EventKind::TriggerMoved { price, bar } => debug!(%symbol, price, bar, "trigger moved"),
    }
}
