//! Position state transitions. The only code that moves a position between states.

use chrono::NaiveDateTime;

use crate::domain::{ExitReason, Position, PositionState};
use crate::error::TransitionError;

fn invalid(pos: &Position, action: &'static str) -> TransitionError {
    TransitionError::InvalidState {
        symbol: pos.symbol.clone(),
        state: pos.state.as_str(),
        action,
    }
}

/// Pending → Open at `price`.
pub fn fill(pos: &mut Position, price: f64, time: NaiveDateTime, bar: usize) -> Result<(), TransitionError> {
    if !pos.is_pending() {
        return Err(invalid(pos, "fill"));
    }
    pos.state = PositionState::Open;
    pos.entry_price = Some(price);
    pos.entry_time = Some(time);
    pos.entry_bar = Some(bar);
    pos.last_price = Some(price);
    pos.open_pnl = 0.0;
    Ok(())
}

/// Update the mark and open P&L of an Open position.
pub fn mark(pos: &mut Position, price: f64) {
    if pos.is_open() && price.is_finite() {
        pos.last_price = Some(price);
        pos.open_pnl = pos.pnl_at(price);
    }
}

/// Close a position and book its P&L. Returns the realized P&L.
///
/// `NoFill` is only valid from Pending and books zero with the plan entry
/// recorded for bookkeeping. Every other reason requires an Open position.
pub fn close(
    pos: &mut Position,
    reason: ExitReason,
    price: f64,
    time: NaiveDateTime,
) -> Result<f64, TransitionError> {
    let pnl = match (pos.state, reason) {
        (PositionState::Pending, ExitReason::NoFill) => {
            pos.entry_price = Some(pos.plan_entry);
            0.0
        }
        (PositionState::Open, ExitReason::NoFill) => return Err(invalid(pos, "expire")),
        (PositionState::Open, _) => pos.pnl_at(price),
        _ => return Err(invalid(pos, "close")),
    };

    pos.state = PositionState::Closed;
    pos.exit_price = Some(price);
    pos.exit_time = Some(time);
    pos.exit_reason = Some(reason);
    pos.realized_pnl = pnl;
    pos.open_pnl = 0.0;
    Ok(pnl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, Pick, SessionTags, TradePlan};
    use chrono::NaiveDate;

    fn pending() -> Position {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut plan = TradePlan::abstain("INFY", day, SessionTags::NEUTRAL, Pick::abstain(""), "");
        plan.direction = Direction::Up;
        plan.entry_price = 100.0;
        plan.stop_price = 98.0;
        plan.risk_per_share = 2.0;
        plan.quantity = 10;
        Position::from_plan(&plan, 4).unwrap()
    }

    fn t() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    #[test]
    fn fill_then_close_books_pnl() {
        let mut pos = pending();
        fill(&mut pos, 100.0, t(), 5).unwrap();
        mark(&mut pos, 101.0);
        assert_eq!(pos.open_pnl, 10.0);
        let pnl = close(&mut pos, ExitReason::Stop, 98.0, t()).unwrap();
        assert_eq!(pnl, -20.0);
        assert_eq!(pos.realized_pnl, -20.0);
        assert_eq!(pos.open_pnl, 0.0);
        assert!(pos.is_closed());
    }

    #[test]
    fn no_fill_books_zero_with_plan_entry() {
        let mut pos = pending();
        assert_eq!(close(&mut pos, ExitReason::NoFill, 100.0, t()).unwrap(), 0.0);
        assert_eq!(pos.entry_price, Some(100.0));
        assert_eq!(pos.exit_reason, Some(ExitReason::NoFill));
    }

    #[test]
    fn illegal_transitions_are_errors() {
        let mut pos = pending();
        assert!(close(&mut pos, ExitReason::Stop, 98.0, t()).is_err());
        fill(&mut pos, 100.0, t(), 5).unwrap();
        assert!(fill(&mut pos, 100.0, t(), 6).is_err());
        assert!(close(&mut pos, ExitReason::NoFill, 100.0, t()).is_err());
        close(&mut pos, ExitReason::EndOfDay, 100.0, t()).unwrap();
        let err = close(&mut pos, ExitReason::EndOfDay, 100.0, t()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidState {
                symbol: "INFY".into(),
                state: "CLOSED",
                action: "close",
            }
        );
    }
}
