//! Append-only JSONL stores: the historical outcome table and the trade journal.
//!
//! Each line is an independent JSON object, so a torn final line never
//! poisons earlier records. Malformed lines are skipped on read.

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use daylock_core::classifier::{classify_day, TagConfig};
use daylock_core::domain::{
    is_weekday, Bar, DaySummary, ExitReason, Outcome, OutcomeRow, OutcomeTable, Position, SessionTags, Side,
};
use daylock_core::planning::{find_prior_day, BarArchive};
use daylock_core::session::SessionConfig;

use crate::config::DaylockConfig;
use crate::store::StoreError;

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = i + 1, error = %e, "skipping malformed line"),
        }
    }
    Ok(records)
}

fn append_lines<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    for record in records {
        let json = serde_json::to_string(record).map_err(|e| StoreError::json(path, e))?;
        writeln!(file, "{json}").map_err(|e| StoreError::io(path, e))?;
    }
    file.flush().map_err(|e| StoreError::io(path, e))
}

// ── Outcome table ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub symbol: String,
    #[serde(flatten)]
    pub row: OutcomeRow,
}

pub struct OutcomeStore {
    path: PathBuf,
}

impl OutcomeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every symbol's table.
    pub fn load_all(&self) -> Result<BTreeMap<String, OutcomeTable>, StoreError> {
        let mut tables: BTreeMap<String, OutcomeTable> = BTreeMap::new();
        for record in read_lines::<OutcomeRecord>(&self.path)? {
            tables
                .entry(record.symbol.clone())
                .or_insert_with(|| OutcomeTable::new(record.symbol.clone()))
                .append(record.row);
        }
        Ok(tables)
    }

    pub fn load_table(&self, symbol: &str) -> Result<OutcomeTable, StoreError> {
        Ok(self
            .load_all()?
            .remove(symbol)
            .unwrap_or_else(|| OutcomeTable::new(symbol)))
    }

    /// Append rows, skipping any (symbol, day) already present. Returns how
    /// many were written.
    pub fn append(&self, records: Vec<OutcomeRecord>) -> Result<usize, StoreError> {
        let mut present: BTreeSet<(String, NaiveDate)> = read_lines::<OutcomeRecord>(&self.path)?
            .into_iter()
            .map(|r| (r.symbol, r.row.day))
            .collect();
        let fresh: Vec<OutcomeRecord> = records
            .into_iter()
            .filter(|r| present.insert((r.symbol.clone(), r.row.day)))
            .collect();
        append_lines(&self.path, &fresh)?;
        debug!(path = %self.path.display(), written = fresh.len(), "outcome rows appended");
        Ok(fresh.len())
    }
}

/// Tag and label one completed day. `None` when the day has no usable bars.
pub fn label_day(
    bars: &[Bar],
    prior: Option<&DaySummary>,
    session: &SessionConfig,
    tags: &TagConfig,
    threshold_pct: f64,
) -> Option<OutcomeRow> {
    let summary = DaySummary::from_bars(bars)?;
    Some(OutcomeRow {
        day: summary.day,
        tags: classify_day(bars, prior, session, tags),
        outcome: Outcome::label(&summary, threshold_pct),
    })
}

/// Rebuild outcome rows for every configured symbol and weekday in `[from, to]`.
pub fn backfill(
    archive: &dyn BarArchive,
    store: &OutcomeStore,
    config: &DaylockConfig,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<usize, StoreError> {
    let mut records = Vec::new();
    for day in from.iter_days().take_while(|d| *d <= to) {
        if !is_weekday(day) {
            continue;
        }
        for symbol in &config.symbols {
            let Some(bars) = archive.day_bars(symbol, day) else {
                continue;
            };
            let prior = find_prior_day(archive, symbol, day, config.tags.prior_day_max_lookback);
            let labelled = label_day(
                &bars,
                prior.as_ref(),
                &config.session,
                &config.tags,
                config.runner.outcome_threshold_pct,
            );
            if let Some(row) = labelled {
                records.push(OutcomeRecord {
                    symbol: symbol.clone(),
                    row,
                });
            }
        }
    }
    store.append(records)
}

// ── Trade journal ────────────────────────────────────────────────────

/// One closed position, NoFill included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub day: NaiveDate,
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub tags: SessionTags,
    pub plan_reason: String,
    pub entry_price: Option<f64>,
    pub entry_time: Option<NaiveDateTime>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: f64,
}

impl JournalRecord {
    pub fn from_position(pos: &Position, tags: SessionTags, plan_reason: &str) -> Self {
        Self {
            day: pos.day,
            symbol: pos.symbol.clone(),
            side: pos.side,
            quantity: pos.quantity,
            tags,
            plan_reason: plan_reason.to_string(),
            entry_price: pos.entry_price,
            entry_time: pos.entry_time,
            exit_price: pos.exit_price,
            exit_time: pos.exit_time,
            exit_reason: pos.exit_reason,
            realized_pnl: pos.realized_pnl,
        }
    }
}

pub struct TradeJournal {
    path: PathBuf,
}

impl TradeJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read_all(&self) -> Result<Vec<JournalRecord>, StoreError> {
        read_lines(&self.path)
    }

    /// Append records not yet journaled for their (day, symbol).
    pub fn append(&self, records: Vec<JournalRecord>) -> Result<usize, StoreError> {
        let mut present: BTreeSet<(NaiveDate, String)> =
            self.read_all()?.into_iter().map(|r| (r.day, r.symbol)).collect();
        let fresh: Vec<JournalRecord> = records
            .into_iter()
            .filter(|r| present.insert((r.day, r.symbol.clone())))
            .collect();
        append_lines(&self.path, &fresh)?;
        Ok(fresh.len())
    }
}
