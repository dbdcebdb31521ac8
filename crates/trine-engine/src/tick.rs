//! One tick of the pipeline.
//!
//! 1. Advance the clock; `dt` is clamped to `max_dt`.
//! 2. Snapshot every input so systems see the newest intact frame each
//!    producer has published.
//! 3. Run systems in scheduled order. The first failure aborts the tick.
//! 4. Commit every output and swap each writer once.
//!
//! A failed tick publishes nothing. After
//! [`max_consecutive_failures`](crate::UnitConfig::max_consecutive_failures)
//! failures in a row the driver gives up on the unit.

use std::time::{Duration, Instant};

use trine_core::TickId;

use crate::context::UnitContext;
use crate::error::TickError;
use crate::kind::UnitKind;
use crate::lifecycle::UnitState;
use crate::metrics::TickMetrics;

/// Summary of a completed tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    /// Tick number.
    pub tick: TickId,
    /// Clamped seconds since the previous tick.
    pub dt: f64,
    /// Input groups that moved to a newer frame.
    pub fresh_reads: u32,
    /// Writers that published.
    pub published: u32,
}

fn micros(d: Duration) -> u64 {
    d.as_micros() as u64
}

impl<U: UnitKind> UnitContext<U> {
    /// Run one tick at `now`, tracking consecutive failures.
    pub(crate) fn run_tick(&mut self, now: Instant) -> Result<TickReport, TickError> {
        if self.lifecycle != UnitState::Running {
            return Err(TickError::NotRunning {
                state: self.lifecycle,
            });
        }
        let result = self.execute_tick(now);
        match &result {
            Ok(_) => {
                self.consecutive_failures = 0;
                self.stats.record_tick(self.metrics.total_us);
            }
            Err(error) => {
                self.consecutive_failures += 1;
                self.stats.record_failure();
                tracing::warn!(
                    tick = %self.time.tick(),
                    failures = self.consecutive_failures,
                    %error,
                    "tick failed"
                );
            }
        }
        result
    }

    /// `true` once the configured number of ticks failed in a row.
    pub(crate) fn failure_budget_exhausted(&self) -> bool {
        self.consecutive_failures >= self.config().max_consecutive_failures
    }

    fn execute_tick(&mut self, now: Instant) -> Result<TickReport, TickError> {
        let started = Instant::now();
        let max_dt = self.config().max_dt;
        self.time.advance(now, max_dt);
        let refresh = self.sync.refresh_inputs()?;
        let fresh_reads = refresh.fresh;

        let schedule = self.systems.schedule()?;
        let mut systems_us = Vec::with_capacity(schedule.len());
        for system in schedule.iter() {
            let t0 = Instant::now();
            (system.run)(self).map_err(|source| TickError::System {
                system: system.name.to_string(),
                source,
            })?;
            systems_us.push((system.name.to_string(), micros(t0.elapsed())));
        }

        let t0 = Instant::now();
        let summary = self.sync.commit_outputs()?;
        let commit_us = micros(t0.elapsed());

        self.metrics = TickMetrics {
            total_us: micros(started.elapsed()),
            systems_us,
            commit_us,
            fresh_reads,
            torn_reads: refresh.torn,
            stale_inputs: refresh.stale,
            contended_swaps: summary.contended,
        };
        Ok(TickReport {
            tick: self.time.tick(),
            dt: self.time.dt(),
            fresh_reads,
            published: summary.published,
        })
    }
}
