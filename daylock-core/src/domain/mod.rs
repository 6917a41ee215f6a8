//! Domain types for daylock

pub mod bar;
pub mod outcome;
pub mod plan;
pub mod position;
pub mod tags;

pub use bar::{is_monotonic, Bar, DaySummary};
pub use outcome::{is_weekday, Outcome, OutcomeRow, OutcomeTable};
pub use plan::{
    Direction, MatchLevel, OpeningRange, Pick, PlanSnapshot, PlanStatus, SampleCounts, TradePlan,
};
pub use position::{ExitReason, Position, PositionState, Side};
pub use tags::{EarlyTrend, OpenLocation, PriorDayContext, SessionTags};
