//! Stop/target engine — deterministic rule table.
//!
//! | EarlyTrend | Pick | Stop                                              |
//! |------------|------|---------------------------------------------------|
//! | Bull       | Up   | OR low, or prior-day low when close enough        |
//! | Bull       | Down | OR high + OR width                                |
//! | Bear       | Down | OR high, or prior-day high when close enough      |
//! | Bear       | Up   | OR low − OR width                                 |
//! | Neutral    | Down | OR high + OR width                                |
//! | Neutral    | Up   | OR low − OR width                                 |
//!
//! Target1 sits 1R from entry and Target2 2R, on the profitable side.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Direction, EarlyTrend, OpeningRange};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// "Close enough" bound as a fraction of entry.
    pub close_pct: f64,
    /// "Close enough" bound as a fraction of the opening-range width.
    pub close_frac_of_range: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            close_pct: 0.002,
            close_frac_of_range: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("no direction to place a stop for")]
    NoDirection,
    #[error("non-finite input to stop/target rules")]
    NonFiniteInput,
    #[error("risk per share {0} is not positive")]
    NonPositiveRisk(f64),
}

/// Prior day's high and low, when a prior day exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorLevels {
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopTargets {
    pub stop: f64,
    pub target1: f64,
    pub target2: f64,
    pub risk_per_share: f64,
}

/// Apply the rule table.
pub fn stop_targets(
    early_trend: EarlyTrend,
    direction: Direction,
    range: &OpeningRange,
    prior: Option<PriorLevels>,
    entry: f64,
    config: &StopConfig,
) -> Result<StopTargets, GeometryError> {
    let finite = [range.high, range.low, entry].iter().all(|v| v.is_finite())
        && prior.map_or(true, |p| p.high.is_finite() && p.low.is_finite());
    if !finite {
        return Err(GeometryError::NonFiniteInput);
    }

    let width = range.width();
    let close_enough = |a: f64, b: f64| (a - b).abs() <= (entry * config.close_pct).min(width.abs() * config.close_frac_of_range);

    let stop = match (early_trend, direction) {
        (_, Direction::Abstain) => return Err(GeometryError::NoDirection),
        (EarlyTrend::Bull, Direction::Up) => match prior {
            Some(p) if close_enough(p.low, range.low) => p.low,
            _ => range.low,
        },
        (EarlyTrend::Bear, Direction::Down) => match prior {
            Some(p) if close_enough(p.high, range.high) => p.high,
            _ => range.high,
        },
        (EarlyTrend::Bull | EarlyTrend::Neutral, Direction::Down) => range.high + width,
        (EarlyTrend::Bear | EarlyTrend::Neutral, Direction::Up) => range.low - width,
    };

    let risk = (entry - stop).abs();
    if !risk.is_finite() || risk <= 0.0 {
        return Err(GeometryError::NonPositiveRisk(risk));
    }

    let sign = direction.sign();
    Ok(StopTargets {
        stop,
        target1: entry + sign * risk,
        target2: entry + sign * 2.0 * risk,
        risk_per_share: risk,
    })
}
