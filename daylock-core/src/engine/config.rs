//! Execution engine configuration.

use serde::{Deserialize, Serialize};

/// Which profit target closes the position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitTarget {
    R1,
    #[default]
    R2,
}

/// Resolution when a bar touches both the stop and the configured target.
///
/// Mirrors a path policy: `StopFirst` is the worst case, `TargetFirst` the
/// optimistic best case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TieBreak {
    #[default]
    StopFirst,
    TargetFirst,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Bar index the initial trigger derives from.
    pub ladder_start_bar: usize,
    /// Bars between trigger refreshes.
    pub ladder_step: usize,
    /// Last bar a trigger may be refreshed on; still Pending after it means no fill.
    pub ladder_final_bar: usize,
    pub exit_target: ExitTarget,
    pub tie_break: TieBreak,
    /// Outward nudge applied to the opening-range boundary at plan time.
    pub entry_nudge: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            ladder_start_bar: 4,
            ladder_step: 2,
            ladder_final_bar: 10,
            exit_target: ExitTarget::R2,
            tie_break: TieBreak::StopFirst,
            entry_nudge: 0.0,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ladder_step == 0 {
            return Err("execution.ladder_step must be > 0".into());
        }
        if self.ladder_final_bar < self.ladder_start_bar {
            return Err(format!(
                "execution.ladder_final_bar ({}) is before ladder_start_bar ({})",
                self.ladder_final_bar, self.ladder_start_bar
            ));
        }
        if !self.entry_nudge.is_finite() || self.entry_nudge < 0.0 {
            return Err("execution.entry_nudge must be a finite, non-negative price".into());
        }
        Ok(())
    }
}
