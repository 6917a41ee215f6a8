//! CSV bar archive: `{dir}/{SYMBOL}/{YYYY-MM-DD}.csv`, one file per symbol-day.
//!
//! Header aliases from common vendor exports are resolved here so the core
//! only ever sees clean [`Bar`]s.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::warn;

use daylock_core::domain::Bar;
use daylock_core::planning::BarArchive;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} line {line}: unparseable time '{value}'")]
    BadTime { path: PathBuf, line: usize, value: String },
    #[error("{path}: bars are not in increasing time order")]
    NotMonotonic { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "datetime", alias = "timestamp", alias = "date")]
    time: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(default, alias = "Volume")]
    volume: Option<f64>,
}

#[derive(Serialize)]
struct CsvOut<'a> {
    time: &'a str,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

const TIME_FORMATS: [&str; 4] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

fn parse_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    // Drop a trailing UTC offset such as "+05:30"; times are exchange-local.
    let local = match value.get(19..) {
        Some(rest) if rest.starts_with('+') || rest.starts_with('-') => &value[..19],
        _ => value,
    };
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(local, fmt).ok())
}

/// An archive that can also record finished days.
pub trait DayArchive: BarArchive {
    fn store_day(&self, symbol: &str, day: NaiveDate, bars: &[Bar]) -> Result<(), ArchiveError>;
}

pub struct CsvArchive {
    dir: PathBuf,
}

impl CsvArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn day_path(&self, symbol: &str, day: NaiveDate) -> PathBuf {
        self.dir.join(symbol).join(format!("{}.csv", day.format("%Y-%m-%d")))
    }

    /// Read one symbol-day. `Ok(None)` if the file does not exist.
    pub fn read_day(&self, symbol: &str, day: NaiveDate) -> Result<Option<Vec<Bar>>, ArchiveError> {
        let path = self.day_path(symbol, day);
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|source| ArchiveError::Csv {
                path: path.clone(),
                source,
            })?;

        let mut bars = Vec::new();
        for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|source| ArchiveError::Csv {
                path: path.clone(),
                source,
            })?;
            let time = parse_time(&row.time).ok_or_else(|| ArchiveError::BadTime {
                path: path.clone(),
                line: i + 2,
                value: row.time.clone(),
            })?;
            bars.push(Bar {
                symbol: symbol.to_string(),
                time,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume.map_or(0, |v| v.max(0.0) as u64),
            });
        }
        if !daylock_core::domain::is_monotonic(&bars) {
            return Err(ArchiveError::NotMonotonic { path });
        }
        Ok(Some(bars))
    }

    /// Write (or replace) one symbol-day.
    pub fn write_day(&self, symbol: &str, day: NaiveDate, bars: &[Bar]) -> Result<PathBuf, ArchiveError> {
        let path = self.day_path(symbol, day);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let csv_err = |source| ArchiveError::Csv {
            path: path.clone(),
            source,
        };
        let mut writer = csv::Writer::from_path(&path).map_err(csv_err)?;
        for bar in bars {
            let time = bar.time.format("%Y-%m-%d %H:%M:%S").to_string();
            writer
                .serialize(CsvOut {
                    time: &time,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                })
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Days archived for `symbol`, ascending.
    pub fn days(&self, symbol: &str) -> Result<Vec<NaiveDate>, ArchiveError> {
        let dir = self.dir.join(symbol);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ArchiveError::Io { path: dir, source }),
        };
        let mut days: Vec<NaiveDate> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
            })
            .collect();
        days.sort();
        Ok(days)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl BarArchive for CsvArchive {
    fn day_bars(&self, symbol: &str, day: NaiveDate) -> Option<Vec<Bar>> {
        match self.read_day(symbol, day) {
            Ok(Some(bars)) if !bars.is_empty() => Some(bars),
            Ok(_) => None,
            Err(e) => {
                warn!(%symbol, %day, error = %e, "skipping unreadable archive day");
                None
            }
        }
    }
}

impl DayArchive for CsvArchive {
    fn store_day(&self, symbol: &str, day: NaiveDate, bars: &[Bar]) -> Result<(), ArchiveError> {
        self.write_day(symbol, day, bars).map(|_| ())
    }
}

/// In-memory archive for tests and synthetic replays.
#[derive(Default)]
pub struct MemoryArchive {
    days: RwLock<BTreeMap<(String, NaiveDate), Vec<Bar>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert bars, grouped by their own symbol and day.
    pub fn insert(&self, bars: impl IntoIterator<Item = Bar>) {
        let mut days = self.days.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        for bar in bars {
            days.entry((bar.symbol.clone(), bar.day())).or_default().push(bar);
        }
        for series in days.values_mut() {
            series.sort_by_key(|b| b.time);
        }
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        let days = self.days.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        days.keys().map(|(symbol, _)| symbol.clone()).collect()
    }
}

impl BarArchive for MemoryArchive {
    fn day_bars(&self, symbol: &str, day: NaiveDate) -> Option<Vec<Bar>> {
        let days = self.days.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        days.get(&(symbol.to_string(), day)).cloned()
    }
}

impl DayArchive for MemoryArchive {
    fn store_day(&self, symbol: &str, day: NaiveDate, bars: &[Bar]) -> Result<(), ArchiveError> {
        let mut days = self.days.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        days.insert((symbol.to_string(), day), bars.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vendor_time_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 15, 0).unwrap();
        assert_eq!(parse_time("2024-01-02 09:15:00"), Some(expected));
        assert_eq!(parse_time("2024-01-02T09:15:00+05:30"), Some(expected));
        assert_eq!(parse_time("2024-01-02 09:15"), Some(expected));
        assert_eq!(parse_time("09:15"), None);
    }

    #[test]
    fn memory_archive_groups_by_day() {
        let archive = MemoryArchive::new();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let bar = |m: u32| Bar {
            symbol: "INFY".into(),
            time: day.and_hms_opt(9, m, 0).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
        };
        archive.insert([bar(20), bar(15)]);
        let bars = archive.day_bars("INFY", day).unwrap();
        assert_eq!(bars[0].time.format("%H:%M").to_string(), "09:15");
        assert!(archive.day_bars("TCS", day).is_none());
    }

    #[test]
    fn csv_day_survives_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let bars: Vec<Bar> = (0..3)
            .map(|i| Bar {
                symbol: "INFY".into(),
                time: day.and_hms_opt(9, 15 + 5 * i, 0).unwrap(),
                open: 100.0 + f64::from(i),
                high: 101.0 + f64::from(i),
                low: 99.5 + f64::from(i),
                close: 100.5 + f64::from(i),
                volume: 1_000,
            })
            .collect();
        archive.store_day("INFY", day, &bars).unwrap();

        assert_eq!(archive.read_day("INFY", day).unwrap().unwrap(), bars);
        assert_eq!(archive.days("INFY").unwrap(), vec![day]);
        assert!(archive.read_day("INFY", day.succ_opt().unwrap()).unwrap().is_none());
    }

    #[test]
    fn vendor_headers_and_missing_volume_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let path = archive.day_path("TCS", day);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "datetime,Open,High,Low,Close\n2024-01-02T09:15:00+05:30,10,11,9,10.5\n2024-01-02T09:20:00+05:30,10.5,11.5,10,11\n",
        )
        .unwrap();
        let bars = archive.read_day("TCS", day).unwrap().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 11.0);
        assert_eq!(bars[0].volume, 0);
    }

    #[test]
    fn out_of_order_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let path = archive.day_path("TCS", day);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "time,open,high,low,close\n2024-01-02 09:20:00,1,1,1,1\n2024-01-02 09:15:00,1,1,1,1\n",
        )
        .unwrap();
        assert!(matches!(archive.read_day("TCS", day), Err(ArchiveError::NotMonotonic { .. })));
        assert!(archive.day_bars("TCS", day).is_none());
    }
}
