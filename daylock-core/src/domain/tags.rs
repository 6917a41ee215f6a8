//! Categorical session tags computed once per (symbol, day).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional read of the early-session window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarlyTrend {
    Bull,
    Bear,
    Neutral,
}

impl EarlyTrend {
    pub fn is_directional(self) -> bool {
        !matches!(self, Self::Neutral)
    }
}

/// Today's open relative to the prior day's high/low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpenLocation {
    /// Open above the prior day's high.
    AboveRange,
    /// Inside the prior range, within the boundary band of the high.
    UpperBoundary,
    /// Clearly inside the prior range.
    MidRange,
    /// Inside the prior range, within the boundary band of the low.
    LowerBoundary,
    /// Open below the prior day's low.
    BelowRange,
    /// No usable prior day.
    Unknown,
}

/// Directional character of the previous trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorDayContext {
    Bull,
    Bear,
    Neutral,
}

/// The three tags for one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionTags {
    pub early_trend: EarlyTrend,
    pub open_location: OpenLocation,
    pub prior_day: PriorDayContext,
}

impl SessionTags {
    /// The no-edge tag set returned for empty or malformed input.
    pub const NEUTRAL: SessionTags = SessionTags {
        early_trend: EarlyTrend::Neutral,
        open_location: OpenLocation::Unknown,
        prior_day: PriorDayContext::Neutral,
    };

    pub fn new(early_trend: EarlyTrend, open_location: OpenLocation, prior_day: PriorDayContext) -> Self {
        Self {
            early_trend,
            open_location,
            prior_day,
        }
    }
}

impl Default for SessionTags {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl fmt::Display for EarlyTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bull => "BULL",
            Self::Bear => "BEAR",
            Self::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

impl fmt::Display for OpenLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AboveRange => "ABOVE_RANGE",
            Self::UpperBoundary => "UPPER_BOUNDARY",
            Self::MidRange => "MID_RANGE",
            Self::LowerBoundary => "LOWER_BOUNDARY",
            Self::BelowRange => "BELOW_RANGE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

impl fmt::Display for PriorDayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bull => "BULL",
            Self::Bear => "BEAR",
            Self::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

impl fmt::Display for SessionTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.early_trend, self.open_location, self.prior_day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_serialize_screaming_snake() {
        let tags = SessionTags::new(EarlyTrend::Bull, OpenLocation::UpperBoundary, PriorDayContext::Bear);
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(
            json,
            r#"{"early_trend":"BULL","open_location":"UPPER_BOUNDARY","prior_day":"BEAR"}"#
        );
    }

    #[test]
    fn display_matches_serialized_names() {
        let tags = SessionTags::NEUTRAL;
        assert_eq!(tags.to_string(), "NEUTRAL/UNKNOWN/NEUTRAL");
    }
}
