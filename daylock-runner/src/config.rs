//! TOML configuration for the whole daylock process.
//!
//! Every section defaults to the production constants, so an empty file is a
//! valid config (apart from the symbol list).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use daylock_core::classifier::TagConfig;
use daylock_core::engine::ExecutionConfig;
use daylock_core::picker::PickerConfig;
use daylock_core::planning::PlanningConfig;
use daylock_core::session::SessionConfig;
use daylock_core::stops::StopConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Split across the day's active plans; also the day loss cap.
    pub daily_risk_budget: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_risk_budget: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub state_path: PathBuf,
    pub archive_dir: PathBuf,
    pub outcomes_path: PathBuf,
    pub journal_path: PathBuf,
    pub poll_interval_ms: u64,
    /// How long the simulator waits for a locked plan before reporting EXECUTION_BLOCKED.
    pub plan_wait_budget_secs: u64,
    /// How long past the plan cutoff the planner waits for every symbol's cutoff bar.
    pub plan_grace_secs: u64,
    /// Open-to-close move (percent) that labels a day Up or Down.
    pub outcome_threshold_pct: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("data/state.json"),
            archive_dir: PathBuf::from("data/bars"),
            outcomes_path: PathBuf::from("data/outcomes.jsonl"),
            journal_path: PathBuf::from("data/journal.jsonl"),
            poll_interval_ms: 1_000,
            plan_wait_budget_secs: 300,
            plan_grace_secs: 60,
            outcome_threshold_pct: 0.2,
        }
    }
}

/// Top-level config. `symbols` comes first so the struct serializes to valid TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaylockConfig {
    pub symbols: Vec<String>,
    pub session: SessionConfig,
    pub tags: TagConfig,
    pub picker: PickerConfig,
    pub stops: StopConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub runner: RunnerConfig,
}

/// Parameters that shape a plan. Paths and polling are left out of the hash.
#[derive(Serialize)]
struct Fingerprint<'a> {
    symbols: &'a [String],
    session: &'a SessionConfig,
    tags: &'a TagConfig,
    picker: &'a PickerConfig,
    stops: &'a StopConfig,
    risk: &'a RiskConfig,
    execution: &'a ExecutionConfig,
}

impl DaylockConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.symbols.is_empty() {
            return invalid("symbols must not be empty".into());
        }
        let mut seen = std::collections::BTreeSet::new();
        for symbol in &self.symbols {
            if symbol.trim().is_empty() {
                return invalid("symbols must not contain blank entries".into());
            }
            if !seen.insert(symbol.as_str()) {
                return invalid(format!("duplicate symbol {symbol}"));
            }
        }

        self.session.validate().map_err(ConfigError::Invalid)?;
        self.execution.validate().map_err(ConfigError::Invalid)?;

        if !self.picker.min_samples.is_strictly_decreasing() {
            return invalid(format!(
                "picker.min_samples must strictly decrease as the level widens: {:?}",
                self.picker.min_samples
            ));
        }
        if !(self.picker.edge_pp.is_finite() && self.picker.edge_pp >= 0.0) {
            return invalid("picker.edge_pp must be a finite, non-negative number".into());
        }
        if self.picker.confidence_floor > 100 {
            return invalid("picker.confidence_floor must be <= 100".into());
        }
        if self.picker.lookback_days <= 0 {
            return invalid("picker.lookback_days must be > 0".into());
        }
        if !(self.risk.daily_risk_budget.is_finite() && self.risk.daily_risk_budget > 0.0) {
            return invalid("risk.daily_risk_budget must be > 0".into());
        }
        if self.runner.poll_interval_ms == 0 {
            return invalid("runner.poll_interval_ms must be > 0".into());
        }
        if !(self.runner.outcome_threshold_pct.is_finite() && self.runner.outcome_threshold_pct >= 0.0) {
            return invalid("runner.outcome_threshold_pct must be >= 0".into());
        }
        Ok(())
    }

    /// Deterministic BLAKE3 fingerprint of the plan-shaping parameters.
    pub fn config_hash(&self) -> String {
        let fingerprint = Fingerprint {
            symbols: &self.symbols,
            session: &self.session,
            tags: &self.tags,
            picker: &self.picker,
            stops: &self.stops,
            risk: &self.risk,
            execution: &self.execution,
        };
        let json = serde_json::to_string(&fingerprint).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    pub fn planning(&self) -> PlanningConfig {
        PlanningConfig {
            session: self.session.clone(),
            tags: self.tags.clone(),
            picker: self.picker.clone(),
            stops: self.stops.clone(),
            daily_risk_budget: self.risk.daily_risk_budget,
            entry_nudge: self.execution.entry_nudge,
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.runner.poll_interval_ms)
    }

    pub fn plan_wait_budget(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.runner.plan_wait_budget_secs as i64)
    }

    pub fn plan_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.runner.plan_grace_secs as i64)
    }
}
