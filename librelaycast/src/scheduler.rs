//! Fixed-interval cycle driver
//!
//! Runs a cycle right away and then once per interval until shutdown is
//! requested. Sleeps in one-second slices so a signal is honored promptly
//! between cycles; within a cycle the pipeline checks the same flag between
//! items.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info};

use crate::error::Result;
use crate::pipeline::{CycleSummary, Pipeline};

const SLEEP_SLICE: Duration = Duration::from_secs(1);

pub struct Scheduler {
    pipeline: Pipeline,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    /// The scheduler shares the pipeline's shutdown flag.
    pub fn new(pipeline: Pipeline, interval: Duration) -> Self {
        let shutdown = pipeline.shutdown_flag();
        Self {
            pipeline,
            interval,
            shutdown,
        }
    }

    /// Run a single cycle
    pub async fn run_once(&self) -> Result<CycleSummary> {
        self.pipeline.run_cycle().await
    }

    /// Run cycles until shutdown; returns how many were started.
    ///
    /// A failed cycle is logged and the loop carries on at the next tick.
    pub async fn run(&self) -> u64 {
        let mut cycles = 0;
        info!(
            "Relaying every {}",
            humantime::format_duration(self.interval)
        );

        loop {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping scheduler");
                break;
            }

            let started = Instant::now();
            cycles += 1;
            match self.pipeline.run_cycle().await {
                Ok(summary) if summary.interrupted => {
                    info!("Cycle {} interrupted by shutdown", cycles);
                }
                Ok(_) => {}
                Err(e) => error!("Cycle {} aborted: {}", cycles, e),
            }

            self.sleep_until(started + self.interval).await;
        }

        cycles
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    async fn sleep_until(&self, deadline: Instant) {
        loop {
            if self.shutdown_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            sleep(SLEEP_SLICE.min(deadline - now)).await;
        }
    }
}
