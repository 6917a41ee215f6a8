//! Picks, trade plans and the once-per-day plan snapshot.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::tags::SessionTags;

/// Directional call for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Up,
    Down,
    Abstain,
}

impl Direction {
    pub fn is_directional(self) -> bool {
        !matches!(self, Self::Abstain)
    }

    /// +1 for Up, -1 for Down, 0 for Abstain.
    pub fn sign(self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
            Self::Abstain => 0.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Abstain => "ABSTAIN",
        };
        f.write_str(s)
    }
}

/// Which backoff pool produced a pick, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchLevel {
    #[serde(rename = "EXACT3")]
    Exact3,
    #[serde(rename = "PAIR2")]
    Pair2,
    #[serde(rename = "SINGLE1")]
    Single1,
    #[serde(rename = "GLOBAL0")]
    Global0,
}

impl MatchLevel {
    /// All levels, narrowest to widest.
    pub const ALL: [MatchLevel; 4] = [Self::Exact3, Self::Pair2, Self::Single1, Self::Global0];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact3 => "EXACT3",
            Self::Pair2 => "PAIR2",
            Self::Single1 => "SINGLE1",
            Self::Global0 => "GLOBAL0",
        }
    }
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome tallies at one match level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounts {
    pub up: u32,
    pub down: u32,
    pub neutral: u32,
}

impl SampleCounts {
    /// Decisive sample size (Neutral outcomes ignored).
    pub fn decisive(&self) -> u32 {
        self.up + self.down
    }

    /// Percentage-point gap between Up and Down shares.
    pub fn gap_pp(&self) -> f64 {
        let n = self.decisive();
        if n == 0 {
            return 0.0;
        }
        let n = f64::from(n);
        (f64::from(self.up) / n * 100.0 - f64::from(self.down) / n * 100.0).abs()
    }

    /// `round(100 * max(up, down) / n)`, 0 when there are no decisive samples.
    pub fn confidence_pct(&self) -> u32 {
        let n = self.decisive();
        if n == 0 {
            return 0;
        }
        (100.0 * f64::from(self.up.max(self.down)) / f64::from(n)).round() as u32
    }

    pub fn leaning(&self) -> Direction {
        match self.up.cmp(&self.down) {
            std::cmp::Ordering::Greater => Direction::Up,
            std::cmp::Ordering::Less => Direction::Down,
            std::cmp::Ordering::Equal => Direction::Abstain,
        }
    }
}

/// Output of the frequency picker for one (symbol, day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub direction: Direction,
    pub confidence_pct: u32,
    pub match_level: MatchLevel,
    pub samples: SampleCounts,
    pub gap_pp: f64,
    pub reason: String,
}

impl Pick {
    pub fn abstain(reason: impl Into<String>) -> Self {
        Self {
            direction: Direction::Abstain,
            confidence_pct: 0,
            match_level: MatchLevel::Global0,
            samples: SampleCounts::default(),
            gap_pp: 0.0,
            reason: reason.into(),
        }
    }
}

/// High/low of the opening-range window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpeningRange {
    pub high: f64,
    pub low: f64,
}

impl OpeningRange {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Per-symbol plan for the day.
///
/// Abstained or rejected symbols keep zero prices and a `reason`. The risk
/// allocator only writes `quantity` and `per_trade_risk_used`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub symbol: String,
    pub day: NaiveDate,
    pub direction: Direction,
    pub tags: SessionTags,
    pub pick: Pick,
    pub opening_range: Option<OpeningRange>,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target1: f64,
    pub target2: f64,
    pub risk_per_share: f64,
    pub quantity: u64,
    pub per_trade_risk_used: f64,
    pub reason: String,
}

impl TradePlan {
    /// An inactive plan that will never be instantiated as a position.
    pub fn abstain(
        symbol: impl Into<String>,
        day: NaiveDate,
        tags: SessionTags,
        pick: Pick,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            day,
            direction: Direction::Abstain,
            tags,
            pick,
            opening_range: None,
            entry_price: 0.0,
            stop_price: 0.0,
            target1: 0.0,
            target2: 0.0,
            risk_per_share: 0.0,
            quantity: 0,
            per_trade_risk_used: 0.0,
            reason: reason.into(),
        }
    }

    /// Has a direction and valid geometry (eligible for allocation).
    pub fn has_valid_call(&self) -> bool {
        self.direction.is_directional() && self.risk_per_share.is_finite() && self.risk_per_share > 0.0
    }

    /// Will be instantiated as a position.
    pub fn is_tradeable(&self) -> bool {
        self.has_valid_call() && self.quantity > 0
    }
}

/// Readiness of a day's plan snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Missing,
    ReadyPartial,
    Ready,
}

/// Immutable, once-per-day freeze of every symbol's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub day: NaiveDate,
    pub status: PlanStatus,
    pub locked: bool,
    pub built_at: NaiveDateTime,
    pub config_hash: String,
    pub daily_risk_budget: f64,
    pub risk_per_trade: f64,
    pub total_planned_risk: f64,
    pub plans: BTreeMap<String, TradePlan>,
}

impl PlanSnapshot {
    /// Plans that will become positions.
    pub fn tradeable(&self) -> impl Iterator<Item = &TradePlan> {
        self.plans.values().filter(|p| p.is_tradeable())
    }

    /// BLAKE3 hash of the snapshot with the build timestamp blanked.
    ///
    /// Two snapshots built from the same inputs hash identically.
    pub fn content_hash(&self) -> String {
        let mut canonical = self.clone();
        canonical.built_at = NaiveDateTime::default();
        let json = serde_json::to_string(&canonical).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_counts_literal_scenario() {
        let counts = SampleCounts {
            up: 10,
            down: 2,
            neutral: 3,
        };
        assert_eq!(counts.decisive(), 12);
        assert!((counts.gap_pp() - 66.666_666).abs() < 1e-3);
        assert_eq!(counts.confidence_pct(), 83);
        assert_eq!(counts.leaning(), Direction::Up);
    }

    #[test]
    fn empty_counts_have_no_edge() {
        let counts = SampleCounts::default();
        assert_eq!(counts.gap_pp(), 0.0);
        assert_eq!(counts.confidence_pct(), 0);
        assert_eq!(counts.leaning(), Direction::Abstain);
    }

    #[test]
    fn match_level_serializes_as_label() {
        assert_eq!(serde_json::to_string(&MatchLevel::Pair2).unwrap(), "\"PAIR2\"");
    }

    #[test]
    fn abstain_plan_is_not_tradeable() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let plan = TradePlan::abstain("INFY", day, SessionTags::NEUTRAL, Pick::abstain("x"), "x");
        assert!(!plan.has_valid_call());
        assert!(!plan.is_tradeable());
    }
}
