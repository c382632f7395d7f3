//! The control loop.
//!
//! One strictly sequential iteration: acquire (primary, then fallback) → schedule
//! detection → draw HUD → show → poll for cancellation. Network reads and inference
//! block the loop, so cancellation latency is bounded by the longest single call.

use std::time::Duration;

use anyhow::Result;

use crate::detect::InferenceModel;
use crate::health::{Backoff, ConnectionHealthMonitor, Sleeper, ThreadSleeper};
use crate::ingest::{FrameAcquirer, FrameSource};
use crate::render::Display;
use crate::schedule::{FrameScheduler, Outcome};

/// Summary of one loop iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Iteration {
    Frame {
        index: u64,
        source: &'static str,
        outcome: Outcome,
        vehicles: usize,
    },
    Disconnected {
        consecutive_failures: u32,
        cooldown: Option<Duration>,
    },
}

/// Totals reported when the loop stops.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub frames: u64,
    pub detections_run: u64,
    pub disconnected: u64,
}

pub struct WatchLoop<P, F, M, D, S = ThreadSleeper> {
    acquirer: FrameAcquirer<P, F>,
    scheduler: FrameScheduler<M>,
    health: ConnectionHealthMonitor,
    display: D,
    sleeper: S,
    stats: LoopStats,
}

impl<P, F, M, D, S> WatchLoop<P, F, M, D, S>
where
    P: FrameSource,
    F: FrameSource,
    M: InferenceModel,
    D: Display,
    S: Sleeper,
{
    pub fn new(
        acquirer: FrameAcquirer<P, F>,
        scheduler: FrameScheduler<M>,
        health: ConnectionHealthMonitor,
        display: D,
        sleeper: S,
    ) -> Self {
        Self {
            acquirer,
            scheduler,
            health,
            display,
            sleeper,
            stats: LoopStats::default(),
        }
    }

    pub fn scheduler(&self) -> &FrameScheduler<M> {
        &self.scheduler
    }

    pub fn health(&self) -> &ConnectionHealthMonitor {
        &self.health
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Run one iteration. Only display errors are returned; acquisition and
    /// detection failures are handled inside.
    pub fn step(&mut self) -> Result<Iteration> {
        self.stats.iterations += 1;
        match self.acquirer.acquire() {
            Ok(acquired) => {
                self.health.record_success();
                let mut processed = self.scheduler.process(acquired.frame);
                self.stats.frames += 1;
                if processed.outcome == Outcome::Detected {
                    self.stats.detections_run += 1;
                }
                self.scheduler
                    .engine()
                    .annotator()
                    .draw_hud(&mut processed.annotated, processed.index);
                self.display.show(&processed.annotated)?;
                log::debug!(
                    "frame {} via {}: {:?}, {} vehicles",
                    processed.index,
                    acquired.source,
                    processed.outcome,
                    processed.annotated.vehicle_count()
                );
                Ok(Iteration::Frame {
                    index: processed.index,
                    source: acquired.source,
                    outcome: processed.outcome,
                    vehicles: processed.annotated.vehicle_count(),
                })
            }
            Err(err) => {
                self.stats.disconnected += 1;
                let backoff = self.health.record_failure();
                let failures = self.health.consecutive_failures();
                log::warn!("no frame this iteration ({} in a row): {}", failures, err);
                let placeholder = self.scheduler.engine().annotator().placeholder(failures);
                self.display.show(&placeholder)?;
                let cooldown = match backoff {
                    Backoff::Proceed => None,
                    Backoff::Cooldown(pause) => {
                        log::info!("camera unreachable; cooling down for {:?}", pause);
                        self.sleeper.sleep(pause);
                        Some(pause)
                    }
                };
                Ok(Iteration::Disconnected {
                    consecutive_failures: failures,
                    cooldown,
                })
            }
        }
    }

    /// Iterate until the display reports a cancel request.
    pub fn run(&mut self) -> Result<LoopStats> {
        loop {
            self.step()?;
            if self.display.poll_cancel() {
                log::info!("cancel requested; stopping");
                return Ok(self.stats.clone());
            }
        }
    }
}
