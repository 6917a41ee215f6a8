//! Tag classifier — derives the three session tags from a day's bars.
//!
//! Pure functions only. Empty or malformed input yields
//! [`SessionTags::NEUTRAL`]; nothing here can fail.

use serde::{Deserialize, Serialize};

use crate::domain::{is_monotonic, Bar, DaySummary, EarlyTrend, OpenLocation, PriorDayContext, SessionTags};
use crate::session::SessionConfig;

/// Thresholds for the three tag heuristics. Percent fields are in percent
/// (0.5 means 0.5%); `*_frac` fields are fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    // ── Prior day ──
    pub narrow_range_pct: f64,
    pub weak_body_frac: f64,
    pub close_loc_bull: f64,
    pub close_loc_bear: f64,
    pub prior_day_max_lookback: u32,

    // ── Open location ──
    pub boundary_band_frac: f64,

    // ── Early trend ──
    pub net_move_pct: f64,
    pub close_pos_top: f64,
    pub close_pos_bottom: f64,
    pub persistence_frac: f64,
    pub chop_range_pct: f64,
    pub chop_move_pct: f64,
    pub chop_overlap: f64,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            narrow_range_pct: 0.5,
            weak_body_frac: 0.3,
            close_loc_bull: 0.6,
            close_loc_bear: 0.4,
            prior_day_max_lookback: 7,
            boundary_band_frac: 0.3,
            net_move_pct: 0.15,
            close_pos_top: 0.7,
            close_pos_bottom: 0.3,
            persistence_frac: 0.6,
            chop_range_pct: 0.25,
            chop_move_pct: 0.05,
            chop_overlap: 0.6,
        }
    }
}

/// Classify a day from its bars and the prior trading day.
///
/// Only bars inside the early window influence `early_trend`; later bars are
/// ignored, so calling this at the plan cutoff or after the close gives the
/// same tags.
pub fn classify_day(
    bars: &[Bar],
    prior: Option<&DaySummary>,
    session: &SessionConfig,
    config: &TagConfig,
) -> SessionTags {
    if bars.is_empty() || !bars.iter().all(Bar::is_sane) || !is_monotonic(bars) {
        return SessionTags::NEUTRAL;
    }
    let today_open = bars[0].open;

    SessionTags {
        early_trend: early_trend(session.early_window(bars), config),
        open_location: open_location(today_open, prior, config),
        prior_day: prior.map_or(PriorDayContext::Neutral, |p| prior_day_context(p, config)),
    }
}

/// Range / body / close-location read of the prior day.
pub fn prior_day_context(prior: &DaySummary, config: &TagConfig) -> PriorDayContext {
    let range = prior.range();
    if !range.is_finite() || range <= 0.0 || prior.close <= 0.0 {
        return PriorDayContext::Neutral;
    }
    if range / prior.close * 100.0 < config.narrow_range_pct {
        return PriorDayContext::Neutral;
    }
    let body = prior.close - prior.open;
    if body.abs() < config.weak_body_frac * range {
        return PriorDayContext::Neutral;
    }
    let close_loc = (prior.close - prior.low) / range;
    if body > 0.0 && close_loc >= config.close_loc_bull {
        PriorDayContext::Bull
    } else if body < 0.0 && close_loc <= config.close_loc_bear {
        PriorDayContext::Bear
    } else {
        PriorDayContext::Neutral
    }
}

/// Bucket today's open against the prior day's range.
pub fn open_location(open: f64, prior: Option<&DaySummary>, config: &TagConfig) -> OpenLocation {
    let Some(prior) = prior else {
        return OpenLocation::Unknown;
    };
    let range = prior.range();
    if !open.is_finite() || !range.is_finite() || range <= 0.0 {
        return OpenLocation::Unknown;
    }
    let band = config.boundary_band_frac * range;
    if open > prior.high {
        OpenLocation::AboveRange
    } else if open < prior.low {
        OpenLocation::BelowRange
    } else if open >= prior.high - band {
        OpenLocation::UpperBoundary
    } else if open <= prior.low + band {
        OpenLocation::LowerBoundary
    } else {
        OpenLocation::MidRange
    }
}

/// Two-of-three vote over the early window, with a chop override.
pub fn early_trend(window: &[Bar], config: &TagConfig) -> EarlyTrend {
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return EarlyTrend::Neutral;
    };
    if first.open <= 0.0 {
        return EarlyTrend::Neutral;
    }

    let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let range = high - low;
    let net_pct = (last.close - first.open) / first.open * 100.0;

    if is_chop(window, range / first.open * 100.0, net_pct, config) {
        return EarlyTrend::Neutral;
    }

    let mut bull = 0;
    let mut bear = 0;

    // Vote 1: net move.
    if net_pct >= config.net_move_pct {
        bull += 1;
    } else if net_pct <= -config.net_move_pct {
        bear += 1;
    }

    // Vote 2: where the window closed within its own range.
    if range > 0.0 {
        let pos = (last.close - low) / range;
        if pos >= config.close_pos_top {
            bull += 1;
        } else if pos <= config.close_pos_bottom {
            bear += 1;
        }
    }

    // Vote 3: bar-by-bar persistence.
    let n = window.len() as f64;
    let ups = window.iter().filter(|b| b.close > b.open).count() as f64;
    let downs = window.iter().filter(|b| b.close < b.open).count() as f64;
    if ups / n >= config.persistence_frac {
        bull += 1;
    } else if downs / n >= config.persistence_frac {
        bear += 1;
    }

    if bull >= 2 {
        EarlyTrend::Bull
    } else if bear >= 2 {
        EarlyTrend::Bear
    } else {
        EarlyTrend::Neutral
    }
}

fn is_chop(window: &[Bar], range_pct: f64, net_pct: f64, config: &TagConfig) -> bool {
    if window.len() < 2 {
        return false;
    }
    range_pct < config.chop_range_pct
        && net_pct.abs() < config.chop_move_pct
        && mean_overlap(window) >= config.chop_overlap
}

/// Mean overlap of consecutive bars, as a fraction of the smaller bar's range.
fn mean_overlap(window: &[Bar]) -> f64 {
    let pairs = window.windows(2).map(|w| {
        let (a, b) = (&w[0], &w[1]);
        let overlap = a.high.min(b.high) - a.low.max(b.low);
        if overlap < 0.0 {
            return 0.0;
        }
        let smaller = a.range().min(b.range());
        if smaller <= 0.0 {
            1.0
        } else {
            (overlap / smaller).min(1.0)
        }
    });
    let (sum, count) = pairs.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
