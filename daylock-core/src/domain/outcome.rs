//! Historical outcome table — one (day, tags, outcome) row per completed day.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::bar::DaySummary;
use super::tags::SessionTags;

/// Realized direction of a completed trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Up,
    Down,
    Neutral,
}

impl Outcome {
    /// Label a completed day by its open-to-close move.
    ///
    /// `threshold_pct` is in percent (0.2 means 0.2%).
    pub fn label(day: &DaySummary, threshold_pct: f64) -> Self {
        if !(day.open > 0.0) || !day.close.is_finite() {
            return Self::Neutral;
        }
        let move_pct = (day.close - day.open) / day.open * 100.0;
        if move_pct >= threshold_pct {
            Self::Up
        } else if move_pct <= -threshold_pct {
            Self::Down
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRow {
    pub day: NaiveDate,
    pub tags: SessionTags,
    pub outcome: Outcome,
}

/// Append-only per-symbol table of completed days, kept sorted by day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTable {
    pub symbol: String,
    rows: Vec<OutcomeRow>,
}

impl OutcomeTable {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            rows: Vec::new(),
        }
    }

    /// Build from rows in any order. Later duplicates of a day are dropped.
    pub fn from_rows(symbol: impl Into<String>, rows: impl IntoIterator<Item = OutcomeRow>) -> Self {
        let mut table = Self::new(symbol);
        let mut rows: Vec<OutcomeRow> = rows.into_iter().collect();
        rows.sort_by_key(|r| r.day);
        for row in rows {
            table.append(row);
        }
        table
    }

    /// Append a row. Returns `false` (and leaves the table untouched) if the
    /// day is already present; existing rows are never rewritten.
    pub fn append(&mut self, row: OutcomeRow) -> bool {
        match self.rows.binary_search_by_key(&row.day, |r| r.day) {
            Ok(_) => false,
            Err(pos) => {
                self.rows.insert(pos, row);
                true
            }
        }
    }

    pub fn rows(&self) -> &[OutcomeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.rows.binary_search_by_key(&day, |r| r.day).is_ok()
    }

    /// Rows strictly before `day` and no older than `lookback_days`.
    pub fn window(
        &self,
        day: NaiveDate,
        lookback_days: i64,
        weekdays_only: bool,
    ) -> impl Iterator<Item = &OutcomeRow> {
        let earliest = day - Duration::days(lookback_days);
        self.rows
            .iter()
            .filter(move |r| r.day < day && r.day >= earliest)
            .filter(move |r| !weekdays_only || is_weekday(r.day))
    }
}

pub fn is_weekday(day: NaiveDate) -> bool {
    !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}
