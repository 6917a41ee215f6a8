//! Position — one per (symbol, day), mutated only by the execution engine.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::plan::{Direction, TradePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn from_direction(direction: Direction) -> Option<Self> {
        match direction {
            Direction::Up => Some(Self::Long),
            Direction::Down => Some(Self::Short),
            Direction::Abstain => None,
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    Pending,
    Open,
    Closed,
}

impl PositionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    Stop,
    Target1,
    Target2,
    EndOfDay,
    NoFill,
}

/// Simulated position seeded from a locked plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub day: NaiveDate,
    pub side: Side,
    pub quantity: u64,
    pub state: PositionState,

    // ── Plan levels (frozen at lock) ──
    pub plan_entry: f64,
    pub stop_price: f64,
    pub target1: f64,
    pub target2: f64,

    // ── Ladder ──
    pub pending_entry_price: f64,
    pub ladder_ref_bar: usize,

    // ── Fill ──
    pub entry_price: Option<f64>,
    pub entry_time: Option<NaiveDateTime>,
    pub entry_bar: Option<usize>,

    // ── Close ──
    pub exit_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_reason: Option<ExitReason>,

    pub last_price: Option<f64>,
    pub realized_pnl: f64,
    pub open_pnl: f64,
}

impl Position {
    /// Seed a Pending position from a plan. Returns `None` for plans that are
    /// not tradeable (Abstain or zero quantity).
    pub fn from_plan(plan: &TradePlan, ladder_start_bar: usize) -> Option<Self> {
        if !plan.is_tradeable() {
            return None;
        }
        let side = Side::from_direction(plan.direction)?;
        Some(Self {
            symbol: plan.symbol.clone(),
            day: plan.day,
            side,
            quantity: plan.quantity,
            state: PositionState::Pending,
            plan_entry: plan.entry_price,
            stop_price: plan.stop_price,
            target1: plan.target1,
            target2: plan.target2,
            pending_entry_price: plan.entry_price,
            ladder_ref_bar: ladder_start_bar,
            entry_price: None,
            entry_time: None,
            entry_bar: None,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
            last_price: None,
            realized_pnl: 0.0,
            open_pnl: 0.0,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.state == PositionState::Pending
    }

    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state == PositionState::Closed
    }

    /// P&L of the filled quantity between entry and `price`.
    pub fn pnl_at(&self, price: f64) -> f64 {
        match self.entry_price {
            Some(entry) => (price - entry) * self.quantity as f64 * self.side.sign(),
            None => 0.0,
        }
    }
}
