// src/notify/dispatcher.rs
//
// Delivery of (bounty, destination) pairs through a sink with bounded
// parallelism. Failures are isolated per pair; a destination that reports a
// rate limit gets its own cooldown without slowing the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::backoff::Backoff;
use crate::ingest::types::Bounty;

use super::{BountyAlert, DeliverError, NotifySink};

/// Final outcome for a single (bounty, destination) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Transient failures exhausted the retry budget.
    Failed(String),
    /// Permanent refusal; retrying would not help.
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub bounty_id: String,
    pub destination_id: String,
    pub outcome: DeliveryOutcome,
}

pub struct Dispatcher {
    sink: Arc<dyn NotifySink>,
    permits: Arc<Semaphore>,
    retry: Backoff,
    /// Earliest next send per destination, set from sink rate-limit replies.
    cooldowns: Mutex<HashMap<String, Instant>>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotifySink>, concurrency: usize, retry: Backoff) -> Self {
        Self {
            sink,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            retry,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    async fn wait_for_destination(&self, destination_id: &str) {
        let until = {
            let cooldowns = self.cooldowns.lock().await;
            cooldowns.get(destination_id).copied()
        };
        if let Some(until) = until {
            if until > Instant::now() {
                tokio::time::sleep_until(until).await;
            }
        }
    }

    async fn note_rate_limit(&self, destination_id: &str, wait: Duration) {
        let until = Instant::now() + wait;
        let mut cooldowns = self.cooldowns.lock().await;
        let entry = cooldowns
            .entry(destination_id.to_string())
            .or_insert(until);
        if *entry < until {
            *entry = until;
        }
    }

    /// Deliver one alert to one destination with bounded retries. Retries are
    /// only issued after a confirmed non-success from the previous attempt.
    pub async fn deliver(
        &self,
        bounty_id: &str,
        destination_id: &str,
        alert: &BountyAlert,
    ) -> DeliveryOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.wait_for_destination(destination_id).await;

            let t0 = std::time::Instant::now();
            let result = self.sink.send(destination_id, alert).await;
            histogram!("dispatch_send_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            match result {
                Ok(()) => {
                    counter!("dispatch_delivered_total").increment(1);
                    tracing::info!(
                        bounty = bounty_id,
                        destination = destination_id,
                        sink = self.sink.name(),
                        "bounty delivered"
                    );
                    return DeliveryOutcome::Delivered;
                }
                Err(DeliverError::Rejected(reason)) => {
                    counter!("dispatch_rejected_total").increment(1);
                    tracing::warn!(
                        bounty = bounty_id,
                        destination = destination_id,
                        %reason,
                        "delivery rejected"
                    );
                    return DeliveryOutcome::Rejected(reason);
                }
                Err(DeliverError::RateLimited { retry_after }) => {
                    counter!("dispatch_rate_limited_total").increment(1);
                    self.note_rate_limit(destination_id, retry_after).await;
                    if attempt >= self.retry.max_attempts {
                        counter!("dispatch_failed_total").increment(1);
                        return DeliveryOutcome::Failed(format!(
                            "still rate limited after {attempt} attempts"
                        ));
                    }
                    // The cooldown itself is the wait; loop back around.
                }
                Err(DeliverError::Transient(reason)) => {
                    if attempt >= self.retry.max_attempts {
                        counter!("dispatch_failed_total").increment(1);
                        tracing::warn!(
                            bounty = bounty_id,
                            destination = destination_id,
                            %reason,
                            attempts = attempt,
                            "delivery failed"
                        );
                        return DeliveryOutcome::Failed(reason);
                    }
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
            }
        }
    }

    /// Deliver a batch of pairs concurrently, bounded by the permit pool.
    /// Every pair gets a report; one pair's failure never aborts a sibling.
    pub async fn deliver_all(self: &Arc<Self>, pairs: Vec<(Bounty, String)>) -> Vec<DeliveryReport> {
        let mut tasks = JoinSet::new();
        for (bounty, destination_id) in pairs {
            let this = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = match this.permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return DeliveryReport {
                            bounty_id: bounty.id,
                            destination_id,
                            outcome: DeliveryOutcome::Failed("dispatcher shut down".to_string()),
                        }
                    }
                };
                let alert = BountyAlert::from_bounty(&bounty);
                let outcome = this.deliver(&bounty.id, &destination_id, &alert).await;
                DeliveryReport {
                    bounty_id: bounty.id,
                    destination_id,
                    outcome,
                }
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(error = %e, "dispatch task panicked"),
            }
        }
        reports
    }
}
