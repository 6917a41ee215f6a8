//! Frequency picker — hierarchical backoff over historical tag/outcome pairs.
//!
//! Four pools are built by relaxing the match key (all three tags, then
//! early trend + open location, then early trend alone, then everything).
//! The narrowest pool with enough samples is chosen, a weak edge broadens to
//! a wider pool that clears both the sample and edge bars, and the final
//! gate turns anything that still falls short into an abstain.
//!
//! The output, including its `reason` string, is a pure function of the
//! inputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Direction, MatchLevel, OutcomeRow, OutcomeTable, Outcome, Pick, SampleCounts, SessionTags};

/// Minimum decisive samples per level. Must strictly decrease as the level widens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinSamples {
    pub exact3: u32,
    pub pair2: u32,
    pub single1: u32,
    pub global0: u32,
}

impl Default for MinSamples {
    fn default() -> Self {
        Self {
            exact3: 8,
            pair2: 6,
            single1: 5,
            global0: 4,
        }
    }
}

impl MinSamples {
    pub fn for_level(&self, level: MatchLevel) -> u32 {
        match level {
            MatchLevel::Exact3 => self.exact3,
            MatchLevel::Pair2 => self.pair2,
            MatchLevel::Single1 => self.single1,
            MatchLevel::Global0 => self.global0,
        }
    }

    pub fn is_strictly_decreasing(&self) -> bool {
        self.exact3 > self.pair2 && self.pair2 > self.single1 && self.single1 > self.global0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerConfig {
    /// Minimum Up/Down gap in percentage points.
    pub edge_pp: f64,
    /// Minimum `round(100 * max / n)`.
    pub confidence_floor: u32,
    pub lookback_days: i64,
    pub weekdays_only: bool,
    /// Abstain when a directional early trend disagrees with the pick.
    pub alignment_veto: bool,
    pub min_samples: MinSamples,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            edge_pp: 8.0,
            confidence_floor: 55,
            lookback_days: 1825,
            weekdays_only: true,
            alignment_veto: true,
            min_samples: MinSamples::default(),
        }
    }
}

/// Tallies for all four levels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelCounts([SampleCounts; 4]);

impl LevelCounts {
    pub fn get(&self, level: MatchLevel) -> SampleCounts {
        self.0[level_slot(level)]
    }
}

fn level_slot(level: MatchLevel) -> usize {
    match level {
        MatchLevel::Exact3 => 0,
        MatchLevel::Pair2 => 1,
        MatchLevel::Single1 => 2,
        MatchLevel::Global0 => 3,
    }
}

/// Narrowest level a historical row shares with today's tags.
fn narrowest_match(today: &SessionTags, row: &SessionTags) -> MatchLevel {
    if row.early_trend != today.early_trend {
        MatchLevel::Global0
    } else if row.open_location != today.open_location {
        MatchLevel::Single1
    } else if row.prior_day != today.prior_day {
        MatchLevel::Pair2
    } else {
        MatchLevel::Exact3
    }
}

/// Tally outcomes into the four nested pools.
pub fn tally<'a>(today: &SessionTags, rows: impl IntoIterator<Item = &'a OutcomeRow>) -> LevelCounts {
    let mut counts = LevelCounts::default();
    for row in rows {
        let narrowest = level_slot(narrowest_match(today, &row.tags));
        // A row in a narrow pool belongs to every wider pool too.
        for slot in narrowest..4 {
            let c = &mut counts.0[slot];
            match row.outcome {
                Outcome::Up => c.up += 1,
                Outcome::Down => c.down += 1,
                Outcome::Neutral => c.neutral += 1,
            }
        }
    }
    counts
}

/// Pick a direction for `day` from the table's rows strictly before it.
pub fn pick(tags: &SessionTags, table: &OutcomeTable, day: NaiveDate, config: &PickerConfig) -> Pick {
    let rows = table.window(day, config.lookback_days, config.weekdays_only);
    pick_from_counts(tags, &tally(tags, rows), config)
}

/// Level selection, broadening, gating and veto over precomputed tallies.
pub fn pick_from_counts(tags: &SessionTags, counts: &LevelCounts, config: &PickerConfig) -> Pick {
    let mins = &config.min_samples;
    let meets_min = |level: MatchLevel| counts.get(level).decisive() >= mins.for_level(level);
    let has_edge = |level: MatchLevel| counts.get(level).gap_pp() >= config.edge_pp;

    // Narrowest level with enough samples.
    let mut chosen = MatchLevel::ALL
        .iter()
        .copied()
        .find(|&l| meets_min(l))
        .unwrap_or(MatchLevel::Global0);

    // Broaden on a weak edge, even past the level chosen above.
    let mut broadened_from = None;
    if !has_edge(chosen) {
        if let Some(wider) = MatchLevel::ALL
            .iter()
            .copied()
            .filter(|&l| l > chosen)
            .find(|&l| meets_min(l) && has_edge(l))
        {
            broadened_from = Some(chosen);
            chosen = wider;
        }
    }

    let samples = counts.get(chosen);
    let n = samples.decisive();
    let gap = samples.gap_pp();
    let conf = samples.confidence_pct();
    let leaning = samples.leaning();

    let mut reason = format!(
        "level={chosen} n={n} up={} down={} gap={gap:.1}pp conf={conf}%",
        samples.up, samples.down
    );
    if let Some(from) = broadened_from {
        reason.push_str(&format!(" (broadened from {from})"));
    }

    let min = mins.for_level(chosen);
    let rejection = if n < min {
        Some(format!("n<{min}"))
    } else if gap < config.edge_pp || leaning == Direction::Abstain {
        Some(format!("gap<{:.1}pp", config.edge_pp))
    } else if conf < config.confidence_floor {
        Some(format!("conf<{}%", config.confidence_floor))
    } else {
        None
    };

    let direction = match rejection {
        Some(why) => {
            reason.push_str(&format!(" [abstain: {why}]"));
            Direction::Abstain
        }
        None if config.alignment_veto && disagrees(tags, leaning) => {
            reason.push_str(&format!(" [veto: early trend {}]", tags.early_trend));
            Direction::Abstain
        }
        None => {
            reason.push_str(&format!(" -> {leaning}"));
            leaning
        }
    };

    Pick {
        direction,
        confidence_pct: conf,
        match_level: chosen,
        samples,
        gap_pp: gap,
        reason,
    }
}

fn disagrees(tags: &SessionTags, direction: Direction) -> bool {
    use crate::domain::EarlyTrend;
    matches!(
        (tags.early_trend, direction),
        (EarlyTrend::Bull, Direction::Down) | (EarlyTrend::Bear, Direction::Up)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EarlyTrend, OpenLocation, PriorDayContext};
    use chrono::Duration;

    fn today() -> SessionTags {
        SessionTags::new(EarlyTrend::Bull, OpenLocation::UpperBoundary, PriorDayContext::Bull)
    }

    /// Build a table of consecutive weekdays ending before 2024-06-03.
    fn table(groups: &[(SessionTags, Outcome, usize)]) -> OutcomeTable {
        let mut day = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        let mut rows = Vec::new();
        for &(tags, outcome, count) in groups {
            for _ in 0..count {
                while !crate::domain::is_weekday(day) {
                    day -= Duration::days(1);
                }
                rows.push(OutcomeRow { day, tags, outcome });
                day -= Duration::days(1);
            }
        }
        OutcomeTable::from_rows("INFY", rows)
    }

    fn target_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[test]
    fn literal_exact3_scenario() {
        let t = table(&[(today(), Outcome::Up, 10), (today(), Outcome::Down, 2)]);
        let p = pick(&today(), &t, target_day(), &PickerConfig::default());
        assert_eq!(p.direction, Direction::Up);
        assert_eq!(p.match_level, MatchLevel::Exact3);
        assert_eq!(p.confidence_pct, 83);
        assert!((p.gap_pp - 66.7).abs() < 0.1);
        assert_eq!(p.reason, "level=EXACT3 n=12 up=10 down=2 gap=66.7pp conf=83% -> UP");
    }

    #[test]
    fn backs_off_to_pair_when_exact_is_thin() {
        let other_prior = SessionTags::new(EarlyTrend::Bull, OpenLocation::UpperBoundary, PriorDayContext::Bear);
        let t = table(&[(today(), Outcome::Up, 3), (other_prior, Outcome::Up, 5), (other_prior, Outcome::Down, 1)]);
        let p = pick(&today(), &t, target_day(), &PickerConfig::default());
        assert_eq!(p.match_level, MatchLevel::Pair2);
        assert_eq!(p.samples.decisive(), 9);
        assert_eq!(p.direction, Direction::Up);
    }

    #[test]
    fn weak_edge_broadens_past_selected_level() {
        // Exact pool: 5 up / 5 down (no edge). Global pool adds strong up days.
        let unrelated = SessionTags::new(EarlyTrend::Neutral, OpenLocation::MidRange, PriorDayContext::Neutral);
        let t = table(&[
            (today(), Outcome::Up, 5),
            (today(), Outcome::Down, 5),
            (unrelated, Outcome::Up, 20),
        ]);
        let p = pick(&today(), &t, target_day(), &PickerConfig::default());
        assert_eq!(p.match_level, MatchLevel::Global0);
        assert_eq!(p.direction, Direction::Up);
        assert!(p.reason.contains("(broadened from EXACT3)"));
    }

    #[test]
    fn no_edge_anywhere_abstains() {
        let t = table(&[(today(), Outcome::Up, 6), (today(), Outcome::Down, 6)]);
        let p = pick(&today(), &t, target_day(), &PickerConfig::default());
        assert_eq!(p.direction, Direction::Abstain);
        assert_eq!(p.match_level, MatchLevel::Exact3);
        assert!(p.reason.ends_with("[abstain: gap<8.0pp]"));
    }

    #[test]
    fn empty_history_abstains_on_sample_size() {
        let t = OutcomeTable::new("INFY");
        let p = pick(&today(), &t, target_day(), &PickerConfig::default());
        assert_eq!(p.direction, Direction::Abstain);
        assert_eq!(p.match_level, MatchLevel::Global0);
        assert!(p.reason.contains("[abstain: n<4]"));
    }

    #[test]
    fn confidence_floor_gates() {
        let config = PickerConfig {
            confidence_floor: 90,
            ..PickerConfig::default()
        };
        let t = table(&[(today(), Outcome::Up, 10), (today(), Outcome::Down, 2)]);
        let p = pick(&today(), &t, target_day(), &config);
        assert_eq!(p.direction, Direction::Abstain);
        assert_eq!(p.reason, "level=EXACT3 n=12 up=10 down=2 gap=66.7pp conf=83% [abstain: conf<90%]");
    }

    #[test]
    fn alignment_veto_blocks_counter_trend_pick() {
        let t = table(&[(today(), Outcome::Down, 10), (today(), Outcome::Up, 2)]);
        let p = pick(&today(), &t, target_day(), &PickerConfig::default());
        assert_eq!(p.direction, Direction::Abstain);
        assert_eq!(
            p.reason,
            "level=EXACT3 n=12 up=2 down=10 gap=66.7pp conf=83% [veto: early trend BULL]"
        );

        let no_veto = PickerConfig {
            alignment_veto: false,
            ..PickerConfig::default()
        };
        assert_eq!(pick(&today(), &t, target_day(), &no_veto).direction, Direction::Down);
    }

    #[test]
    fn rows_on_or_after_target_day_are_ignored() {
        let t = table(&[(today(), Outcome::Up, 10), (today(), Outcome::Down, 2)]);
        let early = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let p = pick(&today(), &t, early, &PickerConfig::default());
        assert!(p.samples.decisive() < 12);
    }

    #[test]
    fn neutral_outcomes_do_not_count_toward_sample_size() {
        let t = table(&[(today(), Outcome::Neutral, 20), (today(), Outcome::Up, 4)]);
        let counts = tally(&today(), t.rows());
        assert_eq!(counts.get(MatchLevel::Exact3).decisive(), 4);
        assert_eq!(counts.get(MatchLevel::Exact3).neutral, 20);
    }
}
