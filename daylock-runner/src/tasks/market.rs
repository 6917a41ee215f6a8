//! Market task: publishes closed bars into the market section.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::debug;

use daylock_core::domain::Bar;

use crate::feed::BarSource;
use crate::store::StatePatch;

use super::TaskContext;

pub const TASK_NAME: &str = "market";

pub struct MarketFeed {
    ctx: TaskContext,
    source: Box<dyn BarSource>,
    published: usize,
}

impl MarketFeed {
    pub fn new(ctx: TaskContext, source: Box<dyn BarSource>) -> Self {
        Self {
            ctx,
            source,
            published: 0,
        }
    }

    pub fn step(&mut self, now: NaiveDateTime) -> anyhow::Result<String> {
        let bars = self.source.poll(now);
        if !bars.is_empty() {
            let mut by_day: BTreeMap<NaiveDate, Vec<Bar>> = BTreeMap::new();
            for bar in bars {
                by_day.entry(bar.day()).or_default().push(bar);
            }
            for (day, bars) in by_day {
                let count = bars.len();
                self.ctx.store.apply(StatePatch::MarketBars { day, bars })?;
                self.published += count;
                debug!(%day, count, "bars published");
            }
        }
        if self.source.is_exhausted() {
            Ok(format!("feed exhausted after {} bars", self.published))
        } else {
            Ok(format!("{} bars published", self.published))
        }
    }
}
