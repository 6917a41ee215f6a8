//! Bar feed — yields closed bars as the clock passes their close time.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::Arc;

use daylock_core::domain::Bar;
use daylock_core::planning::BarArchive;

pub trait BarSource: Send {
    /// Bars that have closed by `now` and were not yielded before, in time order.
    fn poll(&mut self, now: NaiveDateTime) -> Vec<Bar>;

    /// No more bars will ever be yielded.
    fn is_exhausted(&self) -> bool;
}

/// Replays a fixed set of bars against the clock.
pub struct ReplayBarSource {
    bars: Vec<Bar>,
    next: usize,
    bar_length: Duration,
}

impl ReplayBarSource {
    pub fn new(mut bars: Vec<Bar>, bar_minutes: u32) -> Self {
        bars.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.symbol.cmp(&b.symbol)));
        Self {
            bars,
            next: 0,
            bar_length: Duration::minutes(i64::from(bar_minutes)),
        }
    }

    /// All archived bars of `symbols` on `day`.
    pub fn from_archive(archive: &dyn BarArchive, symbols: &[String], day: NaiveDate, bar_minutes: u32) -> Self {
        let bars = symbols
            .iter()
            .filter_map(|symbol| archive.day_bars(symbol, day))
            .flatten()
            .collect();
        Self::new(bars, bar_minutes)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl BarSource for ReplayBarSource {
    fn poll(&mut self, now: NaiveDateTime) -> Vec<Bar> {
        let ready = self.bars[self.next..]
            .iter()
            .take_while(|b| b.time + self.bar_length <= now)
            .count();
        let out = self.bars[self.next..self.next + ready].to_vec();
        self.next += ready;
        out
    }

    fn is_exhausted(&self) -> bool {
        self.next >= self.bars.len()
    }
}

/// Follows today's archive files as an external recorder appends to them.
pub struct ArchiveFollower {
    archive: Arc<dyn BarArchive>,
    symbols: Vec<String>,
    bar_length: Duration,
    last: BTreeMap<String, NaiveDateTime>,
}

impl ArchiveFollower {
    pub fn new(archive: Arc<dyn BarArchive>, symbols: Vec<String>, bar_minutes: u32) -> Self {
        Self {
            archive,
            symbols,
            bar_length: Duration::minutes(i64::from(bar_minutes)),
            last: BTreeMap::new(),
        }
    }
}

impl BarSource for ArchiveFollower {
    fn poll(&mut self, now: NaiveDateTime) -> Vec<Bar> {
        let day = now.date();
        let mut out = Vec::new();
        for symbol in &self.symbols {
            let Some(bars) = self.archive.day_bars(symbol, day) else {
                continue;
            };
            let after = self.last.get(symbol).copied();
            let fresh: Vec<Bar> = bars
                .into_iter()
                .filter(|b| after.map_or(true, |t| b.time > t) && b.time + self.bar_length <= now)
                .collect();
            if let Some(newest) = fresh.last() {
                self.last.insert(symbol.clone(), newest.time);
            }
            out.extend(fresh);
        }
        out.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.symbol.cmp(&b.symbol)));
        out
    }

    fn is_exhausted(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(symbol: &str, m: u32) -> Bar {
        Bar {
            symbol: symbol.into(),
            time: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, m, 0).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
        }
    }

    #[test]
    fn yields_only_closed_bars_once() {
        let mut source = ReplayBarSource::new(vec![bar("B", 20), bar("A", 15), bar("A", 20)], 5);
        let at = |m: u32| NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, m, 0).unwrap();

        assert!(source.poll(at(19)).is_empty());
        assert_eq!(source.poll(at(20)).len(), 1);
        let next = source.poll(at(30));
        assert_eq!(next.iter().map(|b| b.symbol.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
        assert!(source.is_exhausted());
        assert!(source.poll(at(59)).is_empty());
    }

    #[test]
    fn follower_picks_up_appended_bars() {
        let archive = Arc::new(crate::archive::MemoryArchive::new());
        archive.insert([bar("A", 15)]);
        let mut follower = ArchiveFollower::new(archive.clone(), vec!["A".into(), "B".into()], 5);
        let at = |m: u32| NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, m, 0).unwrap();

        assert_eq!(follower.poll(at(20)).len(), 1);
        assert!(follower.poll(at(21)).is_empty());

        archive.insert([bar("A", 20), bar("B", 20)]);
        assert!(follower.poll(at(24)).is_empty());
        assert_eq!(follower.poll(at(25)).len(), 2);
        assert!(!follower.is_exhausted());
    }
}
