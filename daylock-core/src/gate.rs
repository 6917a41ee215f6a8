//! Plan lock and execution gate.
//!
//! The snapshot is written once per day. The gate is the only way the
//! execution side may look at it: execution is allowed iff the snapshot
//! exists for the requested day, is locked, and is Ready or ReadyPartial.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{PlanSnapshot, PlanStatus};
use crate::error::ExecutionBlocked;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub day: NaiveDate,
    pub allowed: bool,
    pub status: PlanStatus,
    pub reason: String,
}

impl GateDecision {
    pub fn into_result(self) -> Result<(), ExecutionBlocked> {
        if self.allowed {
            Ok(())
        } else {
            Err(ExecutionBlocked {
                day: self.day,
                status: self.status,
                reason: self.reason,
            })
        }
    }
}

/// Evaluate the gate for `day`.
pub fn check(snapshot: Option<&PlanSnapshot>, day: NaiveDate) -> GateDecision {
    let deny = |status: PlanStatus, reason: String| GateDecision {
        day,
        allowed: false,
        status,
        reason,
    };

    let Some(snap) = snapshot else {
        return deny(PlanStatus::Missing, "no plan snapshot".into());
    };
    if snap.day != day {
        return deny(PlanStatus::Missing, format!("snapshot is for {}", snap.day));
    }
    if !snap.locked {
        return deny(snap.status, "snapshot not locked".into());
    }
    match snap.status {
        PlanStatus::Ready | PlanStatus::ReadyPartial => GateDecision {
            day,
            allowed: true,
            status: snap.status,
            reason: "locked".into(),
        },
        PlanStatus::Missing => deny(PlanStatus::Missing, "snapshot status is MISSING".into()),
    }
}

/// Return the snapshot only when the gate allows execution for `day`.
pub fn require_locked(snapshot: Option<&PlanSnapshot>, day: NaiveDate) -> Result<&PlanSnapshot, ExecutionBlocked> {
    check(snapshot, day).into_result()?;
    snapshot.ok_or(ExecutionBlocked {
        day,
        status: PlanStatus::Missing,
        reason: "no plan snapshot".into(),
    })
}

/// Result of a lock attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LockOutcome {
    /// A new snapshot was built and locked.
    Built(PlanSnapshot),
    /// The day was already locked; the existing snapshot is returned untouched.
    AlreadyLocked(PlanSnapshot),
}

impl LockOutcome {
    pub fn snapshot(&self) -> &PlanSnapshot {
        match self {
            Self::Built(s) | Self::AlreadyLocked(s) => s,
        }
    }

    pub fn into_snapshot(self) -> PlanSnapshot {
        match self {
            Self::Built(s) | Self::AlreadyLocked(s) => s,
        }
    }
}

/// Build the day's snapshot unless one is already locked for that day.
///
/// `build` is not called when the day is already locked, so repeated calls
/// never change quantities or anything downstream of them.
pub fn lock_once(existing: Option<&PlanSnapshot>, day: NaiveDate, build: impl FnOnce() -> PlanSnapshot) -> LockOutcome {
    if let Some(snap) = existing.filter(|s| s.day == day && s.locked) {
        return LockOutcome::AlreadyLocked(snap.clone());
    }
    let mut snap = build();
    snap.locked = true;
    LockOutcome::Built(snap)
}
