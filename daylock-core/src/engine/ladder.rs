//! Ladder entry — trigger maintenance and entry touch detection.
//!
//! The trigger starts at the plan's entry (opening-range boundary) with the
//! reference bar at `ladder_start_bar`. Every `ladder_step` bars, up to and
//! including `ladder_final_bar`, an unfilled trigger is replaced by the newly
//! closed bar's high (long) or low (short). Callers check the touch before
//! refreshing, so a trigger can never be filled by the bar that set it.

use crate::domain::{Bar, Position, Side};

use super::config::ExecutionConfig;

/// Does `bar` reach the pending trigger? Void bars never touch.
pub fn entry_touched(pos: &Position, bar: &Bar) -> bool {
    if bar.is_void() {
        return false;
    }
    match pos.side {
        Side::Long => bar.high >= pos.pending_entry_price,
        Side::Short => bar.low <= pos.pending_entry_price,
    }
}

/// The bar at `index` may fill only once it is past the reference bar.
pub fn fill_eligible(pos: &Position, index: usize) -> bool {
    index > pos.ladder_ref_bar
}

/// A Pending position past the final ladder bar has expired.
pub fn expired(index: usize, config: &ExecutionConfig) -> bool {
    index > config.ladder_final_bar
}

/// Refresh the trigger from `bar` if the ladder is due. Returns the new
/// trigger when it moved.
pub fn refresh(pos: &mut Position, bar: &Bar, index: usize, config: &ExecutionConfig) -> Option<f64> {
    if bar.is_void() || index > config.ladder_final_bar {
        return None;
    }
    if index < pos.ladder_ref_bar + config.ladder_step {
        return None;
    }
    pos.pending_entry_price = match pos.side {
        Side::Long => bar.high,
        Side::Short => bar.low,
    };
    pos.ladder_ref_bar = index;
    Some(pos.pending_entry_price)
}
