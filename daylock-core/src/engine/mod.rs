//! Paper execution engine — position state machine driven bar by bar.
//!
//! Seeded from a locked plan snapshot through the gate. Each closed bar runs:
//!
//! 1. Ladder: expiry, admission-controlled fill, trigger refresh
//! 2. Exits: intrabar stop/target touches with tie-break
//! 3. Mark-to-market and end-of-day close

pub mod config;
pub mod day;
pub mod exits;
pub mod ladder;
pub mod transition;

pub use config::{ExecutionConfig, ExitTarget, TieBreak};
pub use day::{EngineEvent, EventKind, ExecutionEngine};
pub use exits::{check_exit, ExitHit};
