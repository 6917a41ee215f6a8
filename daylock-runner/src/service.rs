//! Supervisor — spawns the four background tasks on named threads and
//! stops them together.
//!
//! Tasks share nothing but the document store; stopping is cooperative via
//! [`StopSignal`], so a task is only ever interrupted between two complete
//! patches.

use anyhow::Context;
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

use daylock_core::planning::BarArchive;

use crate::archive::DayArchive;
use crate::clock::StopSignal;
use crate::feed::BarSource;
use crate::outcomes::{OutcomeStore, TradeJournal};
use crate::tasks::market::{self, MarketFeed};
use crate::tasks::planner::{self, Planner};
use crate::tasks::settlement::{self, Settlement};
use crate::tasks::simulator::{self, Simulator};
use crate::tasks::{run_loop, TaskContext};

/// External collaborators the tasks read from and write to.
pub struct Services<A> {
    pub archive: Arc<A>,
    pub outcomes: Arc<OutcomeStore>,
    pub journal: Arc<TradeJournal>,
    pub source: Box<dyn BarSource>,
}

pub struct Supervisor {
    stop: StopSignal,
    handles: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>,
}

impl Supervisor {
    pub fn start<A: DayArchive + 'static>(ctx: TaskContext, services: Services<A>) -> anyhow::Result<Self> {
        let Services {
            archive,
            outcomes,
            journal,
            source,
        } = services;
        let mut supervisor = Self {
            stop: ctx.stop.clone(),
            handles: Vec::new(),
        };

        let mut feed = MarketFeed::new(ctx.clone(), source);
        supervisor.spawn(market::TASK_NAME, &ctx, move |now| feed.step(now))?;

        let bar_archive: Arc<dyn BarArchive> = archive.clone();
        let mut planner = Planner::new(ctx.clone(), bar_archive, outcomes.clone());
        supervisor.spawn(planner::TASK_NAME, &ctx, move |now| planner.step(now))?;

        let mut simulator = Simulator::new(ctx.clone());
        supervisor.spawn(simulator::TASK_NAME, &ctx, move |now| simulator.step(now))?;

        let mut settlement = Settlement::new(ctx.clone(), archive, outcomes, journal);
        supervisor.spawn(settlement::TASK_NAME, &ctx, move |now| settlement.step(now))?;

        info!(tasks = supervisor.handles.len(), "supervisor started");
        Ok(supervisor)
    }

    fn spawn<F>(&mut self, name: &'static str, ctx: &TaskContext, step: F) -> anyhow::Result<()>
    where
        F: FnMut(NaiveDateTime) -> anyhow::Result<String> + Send + 'static,
    {
        let ctx = ctx.clone();
        let handle = thread::Builder::new()
            .name(format!("daylock-{name}"))
            .spawn(move || run_loop(name, &ctx, step))
            .with_context(|| format!("failed to spawn {name} task"))?;
        self.handles.push((name, handle));
        Ok(())
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// True while every task thread is still alive.
    pub fn is_healthy(&self) -> bool {
        self.handles.iter().all(|(_, handle)| !handle.is_finished())
    }

    /// Stop every task and wait for it. Returns each task's exit result.
    pub fn shutdown(mut self) -> Vec<(&'static str, anyhow::Result<()>)> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Vec<(&'static str, anyhow::Result<()>)> {
        self.stop.stop();
        let results: Vec<_> = std::mem::take(&mut self.handles)
            .into_iter()
            .map(|(name, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("{name} task panicked")));
                if let Err(e) = &result {
                    error!(task = name, error = %e, "task exited with error");
                }
                (name, result)
            })
            .collect();
        if !results.is_empty() {
            info!("supervisor stopped");
        }
        results
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
