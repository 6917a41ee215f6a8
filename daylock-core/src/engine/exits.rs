//! Exit detection — intrabar stop/target touches with explicit tie-break.
//!
//! Touches use the bar's high and low. When one bar reaches both the stop
//! and the configured target, `TieBreak` decides which one happened first.

use crate::domain::{Bar, ExitReason, Position, Side};

use super::config::{ExecutionConfig, ExitTarget, TieBreak};

/// A resolved exit: reason and the price the position closes at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitHit {
    pub reason: ExitReason,
    pub price: f64,
}

fn target_of(pos: &Position, target: ExitTarget) -> (ExitReason, f64) {
    match target {
        ExitTarget::R1 => (ExitReason::Target1, pos.target1),
        ExitTarget::R2 => (ExitReason::Target2, pos.target2),
    }
}

/// Check an Open position against one bar. `None` means no exit.
pub fn check_exit(pos: &Position, bar: &Bar, config: &ExecutionConfig) -> Option<ExitHit> {
    if bar.is_void() {
        return None;
    }
    let (target_reason, target_price) = target_of(pos, config.exit_target);

    let (stop_hit, target_hit) = match pos.side {
        Side::Long => (bar.low <= pos.stop_price, bar.high >= target_price),
        Side::Short => (bar.high >= pos.stop_price, bar.low <= target_price),
    };

    let stop = ExitHit {
        reason: ExitReason::Stop,
        price: pos.stop_price,
    };
    let target = ExitHit {
        reason: target_reason,
        price: target_price,
    };

    match (stop_hit, target_hit) {
        (true, true) => Some(match config.tie_break {
            TieBreak::StopFirst => stop,
            TieBreak::TargetFirst => target,
        }),
        (true, false) => Some(stop),
        (false, true) => Some(target),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, Pick, SessionTags, TradePlan};
    use chrono::NaiveDate;

    fn open_position(direction: Direction) -> Position {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut plan = TradePlan::abstain("INFY", day, SessionTags::NEUTRAL, Pick::abstain(""), "");
        plan.direction = direction;
        plan.entry_price = 100.0;
        plan.risk_per_share = 2.0;
        plan.quantity = 10;
        if direction == Direction::Up {
            plan.stop_price = 98.0;
            plan.target1 = 102.0;
            plan.target2 = 104.0;
        } else {
            plan.stop_price = 102.0;
            plan.target1 = 98.0;
            plan.target2 = 96.0;
        }
        let mut pos = Position::from_plan(&plan, 4).unwrap();
        pos.entry_price = Some(100.0);
        pos
    }

    fn bar(high: f64, low: f64) -> Bar {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        Bar {
            symbol: "INFY".into(),
            time: day.and_hms_opt(10, 0, 0).unwrap(),
            open: 100.0,
            high,
            low,
            close: 100.0,
            volume: 0,
        }
    }

    #[test]
    fn same_bar_tie_defaults_to_stop() {
        let pos = open_position(Direction::Up);
        let hit = check_exit(&pos, &bar(105.0, 97.0), &ExecutionConfig::default()).unwrap();
        assert_eq!(hit.reason, ExitReason::Stop);
        assert_eq!(hit.price, 98.0);
    }

    #[test]
    fn target_first_is_selectable() {
        let cfg = ExecutionConfig {
            tie_break: TieBreak::TargetFirst,
            ..ExecutionConfig::default()
        };
        let hit = check_exit(&open_position(Direction::Up), &bar(105.0, 97.0), &cfg).unwrap();
        assert_eq!(hit.reason, ExitReason::Target2);
        assert_eq!(hit.price, 104.0);
    }

    #[test]
    fn r2_ignores_target1_touch() {
        let pos = open_position(Direction::Up);
        assert_eq!(check_exit(&pos, &bar(103.0, 99.0), &ExecutionConfig::default()), None);

        let r1 = ExecutionConfig {
            exit_target: ExitTarget::R1,
            ..ExecutionConfig::default()
        };
        assert_eq!(check_exit(&pos, &bar(103.0, 99.0), &r1).unwrap().reason, ExitReason::Target1);
    }

    #[test]
    fn short_side_mirrors() {
        let pos = open_position(Direction::Down);
        let cfg = ExecutionConfig::default();
        assert_eq!(check_exit(&pos, &bar(102.5, 99.0), &cfg).unwrap().reason, ExitReason::Stop);
        assert_eq!(check_exit(&pos, &bar(101.0, 95.0), &cfg).unwrap().price, 96.0);
    }
}
