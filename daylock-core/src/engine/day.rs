//! Day execution engine — drives one day's positions through
//! Pending → Open → Closed against a stream of closed bars.
//!
//! Per bar, for the bar's symbol:
//!
//! 1. Pending: expire past the final ladder bar (NoFill), else check the
//!    current trigger (admission-controlled by the risk engine), else refresh
//!    the ladder. Only bars that close after the plan was locked can fill.
//! 2. Open (not on its fill bar): stop/target touches with tie-break.
//! 3. Open: mark to the bar's close. The bar that closes at the EOD cutoff
//!    closes the position there; bars starting at or after the cutoff are
//!    never traded.
//!
//! Bars are applied at most once per symbol: anything at or before the last
//! bar seen for that symbol is ignored, which also makes restarts safe.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Bar, ExitReason, PlanSnapshot, Position};
use crate::error::{ExecutionBlocked, TransitionError};
use crate::gate;
use crate::risk::{RiskEngine, RiskState};
use crate::session::SessionConfig;

use super::config::ExecutionConfig;
use super::exits::check_exit;
use super::ladder;
use super::transition::{close, fill, mark};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    TriggerMoved { price: f64, bar: usize },
    /// Trigger touched while the risk engine disallowed new entries.
    EntryDenied { bar: usize },
    Filled { price: f64, bar: usize },
    Closed { reason: ExitReason, price: f64, pnl: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub symbol: String,
    pub time: NaiveDateTime,
    #[serde(flatten)]
    pub kind: EventKind,
}

pub struct ExecutionEngine {
    day: NaiveDate,
    session: SessionConfig,
    config: ExecutionConfig,
    risk: RiskEngine,
    positions: BTreeMap<String, Position>,
    last_seen: BTreeMap<String, NaiveDateTime>,
    locked_at: NaiveDateTime,
}

impl ExecutionEngine {
    /// Seed Pending positions from the day's snapshot. Fails unless the gate
    /// allows execution for `day`.
    pub fn from_snapshot(
        snapshot: Option<&PlanSnapshot>,
        day: NaiveDate,
        session: SessionConfig,
        config: ExecutionConfig,
        risk: RiskEngine,
    ) -> Result<Self, ExecutionBlocked> {
        let snap = gate::require_locked(snapshot, day)?;
        let positions = snap
            .tradeable()
            .filter_map(|plan| Position::from_plan(plan, config.ladder_start_bar))
            .map(|pos| (pos.symbol.clone(), pos))
            .collect();

        Ok(Self {
            day,
            session,
            config,
            risk,
            positions,
            last_seen: BTreeMap::new(),
            locked_at: snap.built_at,
        })
    }

    /// Replace seeded positions with previously saved state for the same day
    /// and skip, per symbol, every bar at or before the saved bar time.
    pub fn restore(
        mut self,
        saved: impl IntoIterator<Item = Position>,
        last_seen: impl IntoIterator<Item = (String, NaiveDateTime)>,
    ) -> Self {
        for pos in saved {
            if pos.day == self.day && self.positions.contains_key(&pos.symbol) {
                self.positions.insert(pos.symbol.clone(), pos);
            }
        }
        let day = self.day;
        self.last_seen
            .extend(last_seen.into_iter().filter(|(_, t)| t.date() == day));
        self
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn into_positions(self) -> Vec<Position> {
        self.positions.into_values().collect()
    }

    pub fn risk_state(&self) -> RiskState {
        self.risk.evaluate(self.day, self.positions.values())
    }

    /// Latch the manual kill for this engine's day.
    pub fn kill(&mut self) {
        self.risk.kill(self.day);
    }

    /// Every position is Closed (vacuously true when nothing was tradeable).
    pub fn is_flat(&self) -> bool {
        self.positions.values().all(Position::is_closed)
    }

    /// Latest bar time applied for any symbol.
    pub fn last_bar_time(&self) -> Option<NaiveDateTime> {
        self.last_seen.values().max().copied()
    }

    /// Start time of the last bar applied, per symbol.
    pub fn last_bar_times(&self) -> &BTreeMap<String, NaiveDateTime> {
        &self.last_seen
    }

    /// Apply one closed bar.
    pub fn on_bar(&mut self, bar: &Bar) -> Result<Vec<EngineEvent>, TransitionError> {
        if bar.day() != self.day {
            return Err(TransitionError::WrongDay {
                symbol: bar.symbol.clone(),
                bar_day: bar.day(),
                position_day: self.day,
            });
        }
        if self.last_seen.get(&bar.symbol).is_some_and(|seen| bar.time <= *seen) {
            return Ok(Vec::new());
        }
        self.last_seen.insert(bar.symbol.clone(), bar.time);
        if bar.time.time() >= self.session.eod_cutoff {
            return Ok(Vec::new());
        }

        let Some(index) = self.session.bar_index(bar.time) else {
            return Ok(Vec::new());
        };
        let can_open = self.risk_state().can_open_new_trades;
        let bar_close = self.session.bar_close(bar.time);
        let at_eod = bar_close.time() >= self.session.eod_cutoff;
        let after_lock = bar_close > self.locked_at;
        let Some(pos) = self.positions.get_mut(&bar.symbol) else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        let mut emit = |kind: EventKind| {
            events.push(EngineEvent {
                symbol: bar.symbol.clone(),
                time: bar.time,
                kind,
            })
        };

        if pos.is_pending() {
            if ladder::expired(index, &self.config) || at_eod {
                let price = pos.plan_entry;
                let pnl = close(pos, ExitReason::NoFill, price, bar.time)?;
                emit(EventKind::Closed {
                    reason: ExitReason::NoFill,
                    price,
                    pnl,
                });
                return Ok(events);
            }
            if after_lock && ladder::fill_eligible(pos, index) && ladder::entry_touched(pos, bar) {
                if can_open {
                    let price = pos.pending_entry_price;
                    fill(pos, price, bar.time, index)?;
                    emit(EventKind::Filled { price, bar: index });
                } else {
                    emit(EventKind::EntryDenied { bar: index });
                }
            }
            if pos.is_pending() {
                if let Some(price) = ladder::refresh(pos, bar, index, &self.config) {
                    emit(EventKind::TriggerMoved { price, bar: index });
                }
            }
        }

        if pos.is_open() && pos.entry_bar != Some(index) {
            if let Some(hit) = check_exit(pos, bar, &self.config) {
                let pnl = close(pos, hit.reason, hit.price, bar.time)?;
                emit(EventKind::Closed {
                    reason: hit.reason,
                    price: hit.price,
                    pnl,
                });
            }
        }

        if pos.is_open() && !bar.is_void() {
            mark(pos, bar.close);
            if at_eod {
                let pnl = close(pos, ExitReason::EndOfDay, bar.close, bar.time)?;
                emit(EventKind::Closed {
                    reason: ExitReason::EndOfDay,
                    price: bar.close,
                    pnl,
                });
            }
        }

        Ok(events)
    }

    /// Clock tick without a bar. Once `now` reaches the EOD cutoff, Open
    /// positions close at their last mark and Pending ones expire.
    pub fn on_clock(&mut self, now: NaiveDateTime) -> Result<Vec<EngineEvent>, TransitionError> {
        let cutoff = self.day.and_time(self.session.eod_cutoff);
        if now < cutoff {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        for pos in self.positions.values_mut() {
            let (reason, price) = if pos.is_pending() {
                (ExitReason::NoFill, pos.plan_entry)
            } else if pos.is_open() {
                let price = pos.last_price.or(pos.entry_price).unwrap_or(pos.plan_entry);
                (ExitReason::EndOfDay, price)
            } else {
                continue;
            };
            let pnl = close(pos, reason, price, now)?;
            events.push(EngineEvent {
                symbol: pos.symbol.clone(),
                time: now,
                kind: EventKind::Closed { reason, price, pnl },
            });
        }
        Ok(events)
    }
}
