//! Replay and backfill against an on-disk CSV archive.

mod common;

use chrono::Duration;
use std::collections::BTreeMap;

use daylock_core::domain::{Direction, ExitReason, Outcome, OutcomeTable, PriorDayContext};
use daylock_core::engine::EventKind;
use daylock_runner::{backfill, replay_day, CsvArchive, OutcomeStore, ReplayOptions};

use common::{config, day, history, morning_on, winning_day};

#[test]
fn replay_from_csv_hits_the_second_target() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CsvArchive::new(dir.path());
    archive.write_day("INFY", day(), &winning_day(day(), "INFY")).unwrap();
    let outcomes = OutcomeStore::new(dir.path().join("outcomes.jsonl"));
    outcomes.append(history("INFY")).unwrap();

    let cfg = config(&["INFY"]);
    let summary = replay_day(&cfg, &archive, &outcomes.load_all().unwrap(), day(), ReplayOptions::default()).unwrap();

    let plan = &summary.snapshot.plans["INFY"];
    assert_eq!(plan.direction, Direction::Up);
    assert_eq!(summary.snapshot.config_hash, cfg.config_hash());
    let fills: Vec<_> = summary
        .events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Filled { .. }))
        .collect();
    assert_eq!(fills.len(), 1);
    assert_eq!(summary.positions[0].exit_reason, Some(ExitReason::Target2));

    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("\"TARGET2\""));
}

#[test]
fn symbol_without_bars_abstains_without_blocking_others() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CsvArchive::new(dir.path());
    archive.write_day("INFY", day(), &winning_day(day(), "INFY")).unwrap();
    let mut tables = BTreeMap::new();
    let rows = history("INFY").into_iter().map(|r| r.row);
    tables.insert("INFY".to_string(), OutcomeTable::from_rows("INFY", rows));

    let summary = replay_day(&config(&["INFY", "TCS"]), &archive, &tables, day(), ReplayOptions::default()).unwrap();
    let tcs = &summary.snapshot.plans["TCS"];
    assert_eq!(tcs.direction, Direction::Abstain);
    assert!(tcs.reason.starts_with("DATA_MISSING"));
    assert_eq!(summary.positions.len(), 1);
}

#[test]
fn backfill_labels_weekdays_once() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CsvArchive::new(dir.path().join("bars"));
    let friday = day() - Duration::days(3);
    let saturday = day() - Duration::days(2);
    for d in [friday, saturday, day()] {
        archive.write_day("INFY", d, &winning_day(d, "INFY")).unwrap();
    }
    archive.write_day("INFY", day() - Duration::days(4), &morning_on(day() - Duration::days(4), "INFY")).unwrap();

    let outcomes = OutcomeStore::new(dir.path().join("outcomes.jsonl"));
    let cfg = config(&["INFY"]);
    let written = backfill(&archive, &outcomes, &cfg, friday, day()).unwrap();
    assert_eq!(written, 2);
    assert_eq!(backfill(&archive, &outcomes, &cfg, friday, day()).unwrap(), 0);

    let table = outcomes.load_table("INFY").unwrap();
    assert_eq!(table.rows().iter().map(|r| r.day).collect::<Vec<_>>(), vec![friday, day()]);
    assert!(table.rows().iter().all(|r| r.outcome == Outcome::Up));
    // The strong close before Monday makes its prior-day context directional.
    assert_eq!(table.rows()[1].tags.prior_day, PriorDayContext::Bull);
}
