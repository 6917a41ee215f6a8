//! Session calendar — maps exchange-local times to bar indices and windows.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// Trading session layout. Bar `i` starts at `session_open + i * bar_minutes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub session_open: NaiveTime,
    pub bar_minutes: u32,
    pub opening_range_minutes: u32,
    pub early_window_minutes: u32,
    /// Wall-clock time the plan is built and locked.
    pub plan_cutoff: NaiveTime,
    /// Open positions are force-closed once the clock reaches this time.
    pub eod_cutoff: NaiveTime,
    /// Settlement (outcome labelling, journal) runs after this time.
    pub settlement_time: NaiveTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_open: hm(9, 15),
            bar_minutes: 5,
            opening_range_minutes: 20,
            early_window_minutes: 25,
            plan_cutoff: hm(9, 40),
            eod_cutoff: hm(15, 5),
            settlement_time: hm(15, 35),
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}

impl SessionConfig {
    pub fn open_at(&self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.session_open)
    }

    /// Bar index for a bar starting at `time`; `None` before the open.
    pub fn bar_index(&self, time: NaiveDateTime) -> Option<usize> {
        let elapsed = time - self.open_at(time.date());
        if elapsed < Duration::zero() || self.bar_minutes == 0 {
            return None;
        }
        Some((elapsed.num_minutes() / i64::from(self.bar_minutes)) as usize)
    }

    /// Close time of a bar starting at `time`.
    pub fn bar_close(&self, time: NaiveDateTime) -> NaiveDateTime {
        time + Duration::minutes(i64::from(self.bar_minutes))
    }

    fn window<'a>(&self, bars: &'a [Bar], minutes: u32) -> &'a [Bar] {
        let Some(first) = bars.first() else {
            return bars;
        };
        let end = self.open_at(first.day()) + Duration::minutes(i64::from(minutes));
        let n = bars.iter().take_while(|b| b.time < end).count();
        &bars[..n]
    }

    /// Leading bars inside the early-trend window.
    pub fn early_window<'a>(&self, bars: &'a [Bar]) -> &'a [Bar] {
        self.window(bars, self.early_window_minutes)
    }

    /// Leading bars inside the opening-range window.
    pub fn opening_window<'a>(&self, bars: &'a [Bar]) -> &'a [Bar] {
        self.window(bars, self.opening_range_minutes)
    }

    /// Basic ordering check used by config validation.
    pub fn validate(&self) -> Result<(), String> {
        if self.bar_minutes == 0 {
            return Err("session.bar_minutes must be > 0".into());
        }
        if self.opening_range_minutes == 0 || self.early_window_minutes == 0 {
            return Err("session windows must be > 0 minutes".into());
        }
        let early_end = self.session_open + Duration::minutes(i64::from(self.early_window_minutes));
        if self.plan_cutoff < early_end {
            return Err(format!(
                "session.plan_cutoff {} is before the early window closes at {early_end}",
                self.plan_cutoff
            ));
        }
        if !(self.plan_cutoff < self.eod_cutoff && self.eod_cutoff <= self.settlement_time) {
            return Err("session times must satisfy plan_cutoff < eod_cutoff <= settlement_time".into());
        }
        Ok(())
    }
}
