//! Daylock Runner — orchestration around `daylock-core`.
//!
//! This crate provides:
//! - TOML configuration with a plan-shaping fingerprint
//! - The shared state document and its patch-merging stores
//! - Bar archive, outcome table and trade journal adapters
//! - Clock, bar feed and stop signal
//! - The planner, market, simulator and settlement tasks plus their supervisor
//! - A synchronous single-day replay driver

pub mod archive;
pub mod clock;
pub mod config;
pub mod feed;
pub mod outcomes;
pub mod replay;
pub mod service;
pub mod store;
pub mod tasks;

#[cfg(test)]
mod fixtures;

pub use archive::{ArchiveError, CsvArchive, DayArchive, MemoryArchive};
pub use clock::{Clock, ManualClock, StopSignal, SystemClock};
pub use config::{ConfigError, DaylockConfig, RiskConfig, RunnerConfig};
pub use feed::{ArchiveFollower, BarSource, ReplayBarSource};
pub use outcomes::{backfill, label_day, JournalRecord, OutcomeRecord, OutcomeStore, TradeJournal};
pub use replay::{replay_day, ReplayError, ReplayOptions, ReplaySummary};
pub use service::{Services, Supervisor};
pub use store::{
    ApplyOutcome, ControlSection, DocumentStore, ExecutionSection, ExecutionStatus, FileStore, Heartbeat,
    MarketSection, MemoryStore, SettlementSection, SharedDocument, StatePatch, StoreError,
};
pub use tasks::TaskContext;
