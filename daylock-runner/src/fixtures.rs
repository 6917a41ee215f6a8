//! Shared test data: a Monday where INFY opens with five rising bars and the
//! history favours Up for exactly that tag combination.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

use daylock_core::classifier::classify_day;
use daylock_core::domain::{Bar, Outcome, OutcomeRow, OutcomeTable, PlanSnapshot};

use crate::archive::MemoryArchive;
use crate::config::DaylockConfig;
use crate::tasks::planner::build_day_snapshot;

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

pub fn at_index(index: i64) -> NaiveDateTime {
    at(9, 15) + Duration::minutes(5 * index)
}

pub fn bar(symbol: &str, index: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        symbol: symbol.into(),
        time: at_index(index),
        open,
        high,
        low,
        close,
        volume: 500,
    }
}

/// Bars 0..=4. Entry 101.3, stop 99.9, 2R target 104.1.
pub fn morning(symbol: &str) -> Vec<Bar> {
    (0..5)
        .map(|i| {
            let base = 100.0 + i as f64 * 0.3;
            bar(symbol, i, base, base + 0.4, base - 0.1, base + 0.3)
        })
        .collect()
}

/// Flat bars from `from` through `to` inclusive, never touching 101.3 or 99.9.
pub fn drift(symbol: &str, from: i64, to: i64) -> Vec<Bar> {
    (from..=to).map(|i| bar(symbol, i, 100.8, 101.0, 100.5, 100.9)).collect()
}

pub fn config(symbols: &[&str]) -> DaylockConfig {
    let mut config = DaylockConfig::default();
    config.symbols = symbols.iter().map(|s| s.to_string()).collect();
    config
}

/// Ten Up and two Down days with today's tags.
pub fn history(symbol: &str) -> OutcomeTable {
    let config = DaylockConfig::default();
    let tags = classify_day(&morning(symbol), None, &config.session, &config.tags);
    let rows = (1..=12).map(|k| OutcomeRow {
        day: day() - Duration::days(k * 7),
        tags,
        outcome: if k <= 10 { Outcome::Up } else { Outcome::Down },
    });
    OutcomeTable::from_rows(symbol, rows)
}

pub fn locked_snapshot(config: &DaylockConfig) -> PlanSnapshot {
    let archive = MemoryArchive::new();
    let mut tables = BTreeMap::new();
    for symbol in &config.symbols {
        archive.insert(morning(symbol));
        tables.insert(symbol.clone(), history(symbol));
    }
    build_day_snapshot(config, &archive, &tables, day(), at(9, 40))
}
