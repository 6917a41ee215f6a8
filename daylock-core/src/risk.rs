//! Risk engine — day-level P&L aggregation and the new-entry permission.
//!
//! `RiskState` is a pure function of the position set, the budget and the
//! kill latch. It carries no lifecycle of its own and is rebuilt every tick.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::Position;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub realized_total: f64,
    pub open_total: f64,
    pub day_total: f64,
    pub loss_cap_breached: bool,
    pub manual_kill: bool,
    pub can_open_new_trades: bool,
}

/// Holds the daily budget and the manual kill latch.
///
/// The latch is keyed by day: once set for a day it cannot be cleared for
/// that day, and it stops applying as soon as the engine is asked about a
/// later day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEngine {
    daily_risk_budget: f64,
    kill_day: Option<NaiveDate>,
}

impl RiskEngine {
    pub fn new(daily_risk_budget: f64) -> Self {
        Self {
            daily_risk_budget,
            kill_day: None,
        }
    }

    pub fn daily_risk_budget(&self) -> f64 {
        self.daily_risk_budget
    }

    /// Latch the manual kill for `day`. Later days are unaffected.
    pub fn kill(&mut self, day: NaiveDate) {
        match self.kill_day {
            Some(existing) if existing >= day => {}
            _ => self.kill_day = Some(day),
        }
    }

    pub fn is_killed(&self, day: NaiveDate) -> bool {
        self.kill_day == Some(day)
    }

    pub fn evaluate<'a>(&self, day: NaiveDate, positions: impl IntoIterator<Item = &'a Position>) -> RiskState {
        let mut realized_total = 0.0;
        let mut open_total = 0.0;
        for pos in positions {
            realized_total += pos.realized_pnl;
            if pos.is_open() {
                open_total += pos.open_pnl;
            }
        }
        let day_total = realized_total + open_total;
        let loss_cap_breached = day_total <= -self.daily_risk_budget;
        let manual_kill = self.is_killed(day);

        RiskState {
            realized_total,
            open_total,
            day_total,
            loss_cap_breached,
            manual_kill,
            can_open_new_trades: !manual_kill && !loss_cap_breached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, Pick, PositionState, SessionTags, TradePlan};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn position(state: PositionState, realized: f64, open: f64) -> Position {
        let mut plan = TradePlan::abstain("INFY", day(2), SessionTags::NEUTRAL, Pick::abstain(""), "");
        plan.direction = Direction::Up;
        plan.entry_price = 100.0;
        plan.stop_price = 95.0;
        plan.risk_per_share = 5.0;
        plan.quantity = 10;
        let mut pos = Position::from_plan(&plan, 4).unwrap();
        pos.state = state;
        pos.realized_pnl = realized;
        pos.open_pnl = open;
        pos
    }

    #[test]
    fn aggregates_realized_and_open() {
        let engine = RiskEngine::new(1_000.0);
        let positions = [
            position(PositionState::Closed, -200.0, 0.0),
            position(PositionState::Open, 0.0, 50.0),
            // Stale open P&L on a closed position does not count.
            position(PositionState::Closed, 100.0, 999.0),
        ];
        let state = engine.evaluate(day(2), &positions);
        assert_eq!(state.realized_total, -100.0);
        assert_eq!(state.open_total, 50.0);
        assert_eq!(state.day_total, -50.0);
        assert!(state.can_open_new_trades);
    }

    #[test]
    fn loss_cap_is_inclusive() {
        let engine = RiskEngine::new(1_000.0);
        let positions = [position(PositionState::Open, -600.0, -400.0)];
        let state = engine.evaluate(day(2), &positions);
        assert!(state.loss_cap_breached);
        assert!(!state.can_open_new_trades);
    }

    #[test]
    fn kill_latches_until_rollover() {
        let mut engine = RiskEngine::new(1_000.0);
        engine.kill(day(2));
        assert!(engine.evaluate(day(2), &[]).manual_kill);
        // An older day never overwrites a newer latch.
        engine.kill(day(1));
        assert!(engine.is_killed(day(2)));
        assert!(!engine.evaluate(day(3), &[]).manual_kill);
        assert!(engine.evaluate(day(3), &[]).can_open_new_trades);
    }
}
