//! Error taxonomy for the planning and execution pipeline.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::PlanStatus;
use crate::stops::GeometryError;

/// Per-symbol planning failure. Always isolated to its symbol: the batch
/// converts it into an abstain plan and carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("data missing for {symbol} on {day}: {what}")]
    DataMissing {
        symbol: String,
        day: NaiveDate,
        what: String,
    },
    #[error("bad geometry for {symbol}: {source}")]
    BadGeometry {
        symbol: String,
        #[source]
        source: GeometryError,
    },
}

impl PlanError {
    /// Short machine-readable tag for reason strings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataMissing { .. } => "DATA_MISSING",
            Self::BadGeometry { .. } => "BAD_GEOMETRY",
        }
    }
}

/// The plan gate denied execution for the requested day.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("execution blocked for {day}: {reason} (status {status:?})")]
pub struct ExecutionBlocked {
    pub day: NaiveDate,
    pub status: PlanStatus,
    pub reason: String,
}

/// Illegal position state transition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("{symbol}: position is {state}, cannot {action}")]
    InvalidState {
        symbol: String,
        state: &'static str,
        action: &'static str,
    },
    #[error("{symbol}: bar for {bar_day} does not belong to position day {position_day}")]
    WrongDay {
        symbol: String,
        bar_day: NaiveDate,
        position_day: NaiveDate,
    },
}
