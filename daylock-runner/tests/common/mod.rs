#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::time::{Duration as StdDuration, Instant};

use daylock_core::classifier::classify_day;
use daylock_core::domain::{Bar, Outcome, OutcomeRow};
use daylock_runner::{DaylockConfig, DocumentStore, OutcomeRecord, SharedDocument};

/// Monday 2024-06-03.
pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

pub fn bar_on(day: NaiveDate, symbol: &str, index: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
    Bar {
        symbol: symbol.into(),
        time: day.and_hms_opt(9, 15, 0).unwrap() + Duration::minutes(5 * index),
        open: o,
        high: h,
        low: l,
        close: c,
        volume: 1_000,
    }
}

pub fn morning_on(day: NaiveDate, symbol: &str) -> Vec<Bar> {
    (0..5)
        .map(|i| {
            let base = 100.0 + i as f64 * 0.3;
            bar_on(day, symbol, i, base, base + 0.4, base - 0.1, base + 0.3)
        })
        .collect()
}

/// Morning, a fill at bar 5, the 2R target at bar 6, then flat drift to the close.
pub fn winning_day(day: NaiveDate, symbol: &str) -> Vec<Bar> {
    let mut bars = morning_on(day, symbol);
    bars.push(bar_on(day, symbol, 5, 101.2, 101.5, 101.0, 101.4));
    bars.push(bar_on(day, symbol, 6, 101.4, 104.2, 101.3, 104.0));
    bars.extend((7..74).map(|i| bar_on(day, symbol, i, 104.0, 104.05, 103.9, 104.0)));
    bars
}

/// Ten Up and two Down weeks with the morning's tags.
pub fn history(symbol: &str) -> Vec<OutcomeRecord> {
    let config = DaylockConfig::default();
    let tags = classify_day(&morning_on(day(), symbol), None, &config.session, &config.tags);
    (1..=12)
        .map(|k| OutcomeRecord {
            symbol: symbol.into(),
            row: OutcomeRow {
                day: day() - Duration::days(k * 7),
                tags,
                outcome: if k <= 10 { Outcome::Up } else { Outcome::Down },
            },
        })
        .collect()
}

pub fn config(symbols: &[&str]) -> DaylockConfig {
    let mut config = DaylockConfig::default();
    config.symbols = symbols.iter().map(|s| s.to_string()).collect();
    config
}

/// Poll the store until `pred` holds or ten seconds pass.
pub fn wait_until(store: &dyn DocumentStore, what: &str, pred: impl Fn(&SharedDocument) -> bool) -> SharedDocument {
    let deadline = Instant::now() + StdDuration::from_secs(10);
    loop {
        let doc = store.load().unwrap();
        if pred(&doc) {
            return doc;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}: {doc:#?}");
        std::thread::sleep(StdDuration::from_millis(10));
    }
}
