// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::status::StatusBoard;

use super::Pipeline;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    pub initial_delay: Duration,
}

/// Spawn the poll loop. At most one cycle is ever in flight: the next tick is
/// awaited only after the previous cycle fully completed, and ticks that fall
/// due during a long cycle are skipped, not queued. The shutdown signal is
/// checked only between cycles, so an in-flight dispatch pass drains before
/// the task exits.
pub fn spawn_poller(
    cfg: SchedulerCfg,
    pipeline: Arc<Pipeline>,
    status: Arc<StatusBoard>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = time::Instant::now() + cfg.initial_delay;
        let mut ticker = time::interval_at(start, cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    tracing::info!("poller shutting down");
                    break;
                }
            }
            if *shutdown.borrow() {
                tracing::info!("poller shutting down");
                break;
            }

            let summary = pipeline.run_cycle().await;
            tracing::info!(
                target: "poller",
                fetched = summary.fetched,
                fresh = summary.fresh,
                pairs = summary.matched_pairs,
                delivered = summary.delivered,
                failed = summary.failed,
                rejected = summary.rejected,
                error = summary.error.as_deref().unwrap_or(""),
                "poll cycle finished"
            );
            status.record_cycle(summary);
        }
    })
}
