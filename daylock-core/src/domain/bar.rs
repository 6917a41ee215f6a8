//! Bar — the fundamental market data unit.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Closed intraday OHLCV bar for a single symbol.
///
/// `time` is the bar's start time in exchange-local time. A bar is only ever
/// handed to the core once it has closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: u64,
}

impl Bar {
    pub fn day(&self) -> NaiveDate {
        self.time.date()
    }

    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Daily OHLC rollup of one trading day's bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub day: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl DaySummary {
    /// Roll sane bars up into a single day. Returns `None` when no sane bar exists.
    pub fn from_bars(bars: &[Bar]) -> Option<Self> {
        let mut sane = bars.iter().filter(|b| b.is_sane());
        let first = sane.next()?;
        let mut summary = Self {
            day: first.day(),
            open: first.open,
            high: first.high,
            low: first.low,
            close: first.close,
        };
        for bar in sane {
            summary.high = summary.high.max(bar.high);
            summary.low = summary.low.min(bar.low);
            summary.close = bar.close;
        }
        Some(summary)
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Verify bars are strictly increasing in time.
pub fn is_monotonic(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].time < w[1].time)
}
