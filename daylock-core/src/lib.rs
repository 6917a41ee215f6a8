//! Daylock Core — intraday decision-to-execution pipeline.
//!
//! Everything here is a pure function of its inputs (no I/O, no clocks):
//! - Domain types (bars, session tags, outcome table, picks, plans, positions)
//! - Tag classifier and hierarchical frequency picker
//! - Stop/target rule table and risk allocator
//! - Plan snapshot building, lock and execution gate
//! - Paper execution engine and day-level risk engine

pub mod allocator;
pub mod classifier;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gate;
pub mod picker;
pub mod planning;
pub mod risk;
pub mod session;
pub mod stops;
