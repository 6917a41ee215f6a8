//! Background tasks. Each task owns one section of the shared document and
//! talks to the others only through [`StatePatch`]es.
//!
//! A task is a `step(now)` function driven by [`run_loop`]: errors from a
//! step are logged and retried on the next poll, never propagated out of
//! the loop.

pub mod market;
pub mod planner;
pub mod settlement;
pub mod simulator;

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::{Clock, StopSignal};
use crate::config::DaylockConfig;
use crate::store::{DocumentStore, Heartbeat, StatePatch, StoreError};

/// Handles every task shares.
#[derive(Clone)]
pub struct TaskContext {
    pub config: Arc<DaylockConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
    pub stop: StopSignal,
}

impl TaskContext {
    pub fn heartbeat(&self, task: &str, note: impl Into<String>) -> Result<(), StoreError> {
        self.store
            .apply(StatePatch::Heartbeat {
                task: task.to_string(),
                beat: Heartbeat {
                    at: self.clock.now(),
                    note: note.into(),
                },
            })
            .map(|_| ())
    }
}

/// Drive `step` once per poll interval until the stop signal fires.
pub fn run_loop<F>(name: &str, ctx: &TaskContext, mut step: F) -> anyhow::Result<()>
where
    F: FnMut(NaiveDateTime) -> anyhow::Result<String>,
{
    debug!(task = name, "task started");
    let interval = ctx.config.poll_interval();
    let mut last_note = String::new();
    while !ctx.stop.is_stopped() {
        let note = match step(ctx.clock.now()) {
            Ok(note) => note,
            Err(e) => {
                warn!(task = name, error = %e, "step failed, retrying next poll");
                format!("error: {e}")
            }
        };
        if note != last_note {
            debug!(task = name, %note, "status");
        }
        if let Err(e) = ctx.heartbeat(name, note.clone()) {
            warn!(task = name, error = %e, "heartbeat write failed");
        }
        last_note = note;
        if ctx.stop.sleep(interval) {
            break;
        }
    }
    debug!(task = name, "task stopped");
    Ok(())
}
