//! Shared state document — the only channel between background tasks.
//!
//! Writers never hand over a whole document. They build a typed
//! [`StatePatch`] and the store runs one read → merge → write-temp → rename
//! cycle per patch, so a reader in any process sees either the old or the new
//! document and no writer clobbers a section it does not own.
//!
//! [`FileStore`] serialises that cycle across processes with an advisory
//! lock on a `<state>.lock` sidecar; the `run` daemon and one-shot commands
//! such as `kill` share the same file.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use fd_lock::RwLock;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use daylock_core::domain::{Bar, PlanSnapshot, Position};
use daylock_core::risk::RiskState;

/// Current schema version of the persisted document.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ── Sections ─────────────────────────────────────────────────────────

/// Bars published so far for the current day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSection {
    pub day: Option<NaiveDate>,
    pub bars: BTreeMap<String, Vec<Bar>>,
}

impl MarketSection {
    /// All bars of `day` in (time, symbol) order.
    pub fn bars_in_time_order(&self, day: NaiveDate) -> Vec<Bar> {
        if self.day != Some(day) {
            return Vec::new();
        }
        let mut bars: Vec<Bar> = self.bars.values().flatten().cloned().collect();
        bars.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.symbol.cmp(&b.symbol)));
        bars
    }

    pub fn symbol_bars(&self, day: NaiveDate, symbol: &str) -> &[Bar] {
        match (self.day == Some(day), self.bars.get(symbol)) {
            (true, Some(bars)) => bars,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    WaitingForPlan,
    ExecutionBlocked,
    Running,
    FlatForDay,
}

/// Owned by the simulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSection {
    pub day: Option<NaiveDate>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub positions: Vec<Position>,
    pub risk: RiskState,
    pub last_bar_time: Option<NaiveDateTime>,
    /// Start time of the last bar applied, per symbol. Restarts resume from here.
    #[serde(default)]
    pub last_bar_times: BTreeMap<String, NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSection {
    pub manual_kill_day: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementSection {
    pub day: NaiveDate,
    pub settled_at: NaiveDateTime,
    pub outcomes_appended: usize,
    pub journal_records: usize,
    pub realized_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub at: NaiveDateTime,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedDocument {
    pub version: u32,
    pub plan: Option<PlanSnapshot>,
    pub market: MarketSection,
    pub execution: ExecutionSection,
    pub control: ControlSection,
    pub settlement: Option<SettlementSection>,
    pub health: BTreeMap<String, Heartbeat>,
}

// ── Patches ──────────────────────────────────────────────────────────

/// A complete, self-consistent change to one section.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePatch {
    /// Write-once per day.
    Plan(PlanSnapshot),
    /// Append bars for `day`; a new day replaces the section.
    MarketBars { day: NaiveDate, bars: Vec<Bar> },
    Execution(ExecutionSection),
    Control(ControlSection),
    Settlement(SettlementSection),
    Heartbeat { task: String, beat: Heartbeat },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Ignored(String),
}

impl SharedDocument {
    /// Merge one patch into the document.
    pub fn merge(&mut self, patch: StatePatch) -> ApplyOutcome {
        self.version = DOCUMENT_VERSION;
        match patch {
            StatePatch::Plan(snapshot) => {
                if let Some(existing) = self.plan.as_ref().filter(|p| p.day == snapshot.day && p.locked) {
                    return ApplyOutcome::Ignored(format!("plan for {} already locked", existing.day));
                }
                self.plan = Some(snapshot);
            }
            StatePatch::MarketBars { day, bars } => {
                if self.market.day != Some(day) {
                    self.market = MarketSection {
                        day: Some(day),
                        bars: BTreeMap::new(),
                    };
                }
                for bar in bars.into_iter().filter(|b| b.day() == day) {
                    let series = self.market.bars.entry(bar.symbol.clone()).or_default();
                    if series.last().map_or(true, |last| bar.time > last.time) {
                        series.push(bar);
                    }
                }
            }
            StatePatch::Execution(section) => self.execution = section,
            StatePatch::Control(control) => {
                // Monotonic: a kill is never cleared by an older day.
                let latest = match (self.control.manual_kill_day, control.manual_kill_day) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                self.control.manual_kill_day = latest;
            }
            StatePatch::Settlement(section) => self.settlement = Some(section),
            StatePatch::Heartbeat { task, beat } => {
                self.health.insert(task, beat);
            }
        }
        ApplyOutcome::Applied
    }

    /// The snapshot, if it belongs to `day`.
    pub fn plan_for(&self, day: NaiveDate) -> Option<&PlanSnapshot> {
        self.plan.as_ref().filter(|p| p.day == day)
    }

    pub fn kill_active(&self, day: NaiveDate) -> bool {
        self.control.manual_kill_day == Some(day)
    }
}

// ── Stores ───────────────────────────────────────────────────────────

pub trait DocumentStore: Send + Sync {
    fn load(&self) -> Result<SharedDocument, StoreError>;
    fn apply(&self, patch: StatePatch) -> Result<ApplyOutcome, StoreError>;
}

/// JSON file with atomic whole-document replacement.
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.clone().into_os_string();
        lock_name.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_name),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn read(&self) -> Result<SharedDocument, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(SharedDocument::default()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| StoreError::json(&self.path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SharedDocument::default()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    /// Each write goes through its own temp file in the target directory.
    fn write(&self, doc: &SharedDocument) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(doc).map_err(|e| StoreError::json(&self.path, e))?;
        let dir = self.dir();
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        tmp.write_all(&json).map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;

        // Atomic rename
        tmp.persist(&self.path).map_err(|e| StoreError::io(&self.path, e.error))?;
        Ok(())
    }
}

impl DocumentStore for FileStore {
    fn load(&self) -> Result<SharedDocument, StoreError> {
        self.read()
    }

    fn apply(&self, patch: StatePatch) -> Result<ApplyOutcome, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let dir = self.dir();
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| StoreError::io(&self.lock_path, e))?;
        let mut file_lock = RwLock::new(lock_file);
        let _held = file_lock.write().map_err(|e| StoreError::io(&self.lock_path, e))?;

        let mut doc = self.read()?;
        let outcome = doc.merge(patch);
        if outcome == ApplyOutcome::Applied {
            self.write(&doc)?;
        } else {
            debug!(path = %self.path.display(), ?outcome, "patch not applied");
        }
        Ok(outcome)
    }
}

/// In-process store for tests and the replay driver.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<SharedDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> Result<SharedDocument, StoreError> {
        Ok(self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone())
    }

    fn apply(&self, patch: StatePatch) -> Result<ApplyOutcome, StoreError> {
        let mut doc = self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(doc.merge(patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daylock_core::domain::PlanStatus;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn snapshot(d: u32, total: f64) -> PlanSnapshot {
        PlanSnapshot {
            day: day(d),
            status: PlanStatus::Ready,
            locked: true,
            built_at: day(d).and_hms_opt(9, 40, 0).unwrap(),
            config_hash: "h".into(),
            daily_risk_budget: 1_000.0,
            risk_per_trade: 0.0,
            total_planned_risk: total,
            plans: BTreeMap::new(),
        }
    }

    fn bar(symbol: &str, d: u32, h: u32, m: u32) -> Bar {
        Bar {
            symbol: symbol.into(),
            time: day(d).and_hms_opt(h, m, 0).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
        }
    }

    #[test]
    fn plan_is_write_once_per_day() {
        let mut doc = SharedDocument::default();
        assert_eq!(doc.merge(StatePatch::Plan(snapshot(2, 1.0))), ApplyOutcome::Applied);
        assert!(matches!(doc.merge(StatePatch::Plan(snapshot(2, 2.0))), ApplyOutcome::Ignored(_)));
        assert_eq!(doc.plan.as_ref().unwrap().total_planned_risk, 1.0);
        assert_eq!(doc.merge(StatePatch::Plan(snapshot(3, 3.0))), ApplyOutcome::Applied);
    }

    #[test]
    fn market_bars_append_dedupe_and_roll() {
        let mut doc = SharedDocument::default();
        doc.merge(StatePatch::MarketBars {
            day: day(2),
            bars: vec![bar("A", 2, 9, 15), bar("A", 2, 9, 20), bar("B", 2, 9, 15)],
        });
        doc.merge(StatePatch::MarketBars {
            day: day(2),
            bars: vec![bar("A", 2, 9, 20), bar("A", 2, 9, 25), bar("A", 3, 9, 15)],
        });
        assert_eq!(doc.market.bars["A"].len(), 3);
        let ordered = doc.market.bars_in_time_order(day(2));
        assert_eq!(ordered[0].symbol, "A");
        assert_eq!(ordered[1].symbol, "B");

        doc.merge(StatePatch::MarketBars {
            day: day(3),
            bars: vec![bar("A", 3, 9, 15)],
        });
        assert_eq!(doc.market.day, Some(day(3)));
        assert_eq!(doc.market.bars["A"].len(), 1);
        assert!(doc.market.symbol_bars(day(2), "A").is_empty());
    }

    #[test]
    fn kill_day_never_moves_backwards() {
        let mut doc = SharedDocument::default();
        doc.merge(StatePatch::Control(ControlSection {
            manual_kill_day: Some(day(3)),
        }));
        doc.merge(StatePatch::Control(ControlSection {
            manual_kill_day: Some(day(2)),
        }));
        doc.merge(StatePatch::Control(ControlSection { manual_kill_day: None }));
        assert!(doc.kill_active(day(3)));
    }

    #[test]
    fn patches_leave_other_sections_alone() {
        let store = MemoryStore::new();
        store.apply(StatePatch::Plan(snapshot(2, 1.0))).unwrap();
        store
            .apply(StatePatch::Execution(ExecutionSection {
                day: Some(day(2)),
                status: ExecutionStatus::Running,
                ..ExecutionSection::default()
            }))
            .unwrap();
        store
            .apply(StatePatch::Heartbeat {
                task: "market".into(),
                beat: Heartbeat {
                    at: day(2).and_hms_opt(9, 45, 0).unwrap(),
                    note: "ok".into(),
                },
            })
            .unwrap();
        let doc = store.load().unwrap();
        assert!(doc.plan_for(day(2)).is_some());
        assert_eq!(doc.execution.status, ExecutionStatus::Running);
        assert_eq!(doc.health["market"].note, "ok");
        assert_eq!(doc.version, DOCUMENT_VERSION);
    }
}
