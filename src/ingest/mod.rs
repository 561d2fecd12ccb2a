// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;

use crate::backoff::Backoff;
use crate::matcher;
use crate::notify::dispatcher::{DeliveryOutcome, Dispatcher};
use crate::status::CycleSummary;
use crate::store::ledger::SeenLedger;
use crate::store::subscriptions::SubscriptionStore;

use self::types::{Bounty, BountySource, FetchError};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_cycles_total", "Completed poll cycles.");
        describe_counter!(
            "poll_cycle_failures_total",
            "Cycles aborted before dispatch (fetch or ledger failure)."
        );
        describe_counter!(
            "source_fetch_retries_total",
            "Retried fetch attempts within cycles."
        );
        describe_counter!("source_rate_limited_total", "HTTP 429 replies from the source.");
        describe_counter!("bounties_fetched_total", "Bounties returned by the source.");
        describe_counter!("bounties_new_total", "Bounties not present in the seen ledger.");
        describe_counter!(
            "bounties_unroutable_total",
            "Fresh bounties with no usable location."
        );
        describe_counter!("dispatch_delivered_total", "Successful deliveries.");
        describe_counter!(
            "dispatch_failed_total",
            "Deliveries that exhausted their retry budget."
        );
        describe_counter!("dispatch_rejected_total", "Permanently refused deliveries.");
        describe_counter!(
            "dispatch_rate_limited_total",
            "Rate-limit replies from the sink."
        );
        describe_histogram!("source_parse_ms", "Source response parse time in milliseconds.");
        describe_histogram!("dispatch_send_ms", "Sink send time in milliseconds.");
        describe_gauge!("poll_last_cycle_ts", "Unix ts when the last cycle started.");
    });
}

/// Fetch the current bounty list, retrying transient and rate-limit errors
/// within the cycle's bounded attempt budget. Rate limits wait the mandated
/// duration instead of the schedule's.
pub async fn fetch_with_retry(
    source: &dyn BountySource,
    policy: &Backoff,
) -> Result<Vec<Bounty>, FetchError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match source.fetch_open().await {
            Ok(list) => return Ok(list),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = e.retry_after().unwrap_or_else(|| policy.delay_for(attempt));
                counter!("source_fetch_retries_total").increment(1);
                tracing::warn!(
                    source = source.name(),
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "fetch failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The fetch → filter → match → dispatch pipeline, run once per scheduler
/// tick.
pub struct Pipeline {
    source: Arc<dyn BountySource>,
    ledger: Arc<SeenLedger>,
    subscriptions: Arc<SubscriptionStore>,
    dispatcher: Arc<Dispatcher>,
    fetch_retry: Backoff,
    wildcard: String,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn BountySource>,
        ledger: Arc<SeenLedger>,
        subscriptions: Arc<SubscriptionStore>,
        dispatcher: Arc<Dispatcher>,
        fetch_retry: Backoff,
        wildcard: String,
    ) -> Self {
        Self {
            source,
            ledger,
            subscriptions,
            dispatcher,
            fetch_retry,
            wildcard,
        }
    }

    /// Run one complete cycle. Never panics or propagates: all failure modes
    /// end up in the returned summary.
    pub async fn run_cycle(&self) -> CycleSummary {
        ensure_metrics_described();
        let started = Utc::now();
        let mut summary = CycleSummary::begin(started);

        let fetched = match fetch_with_retry(self.source.as_ref(), &self.fetch_retry).await {
            Ok(list) => list,
            Err(e) => {
                counter!("poll_cycle_failures_total").increment(1);
                tracing::warn!(error = %e, "cycle aborted before filtering");
                summary.error = Some(e.to_string());
                return summary;
            }
        };
        summary.fetched = fetched.len();

        // Dedup against the ledger; also collapse duplicate ids within the
        // same response body.
        let mut fresh: Vec<Bounty> = Vec::new();
        for bounty in fetched {
            if bounty.id.is_empty() {
                tracing::warn!("bounty without id skipped");
                continue;
            }
            if self.ledger.is_new(&bounty.id) && !fresh.iter().any(|b| b.id == bounty.id) {
                fresh.push(bounty);
            }
        }
        summary.fresh = fresh.len();
        counter!("bounties_new_total").increment(fresh.len() as u64);

        if !fresh.is_empty() {
            // Commit "seen" before any dispatch so a failed delivery is not
            // replayed as new on the next cycle. If the commit itself fails,
            // dispatching would risk duplicates after a restart, so the cycle
            // aborts here instead.
            if let Err(e) = self
                .ledger
                .mark_seen(fresh.iter().map(|b| b.id.as_str()), started)
                .await
            {
                counter!("poll_cycle_failures_total").increment(1);
                tracing::error!(error = %e, "seen ledger write failed, dispatch skipped");
                summary.error = Some(format!("ledger write failed: {e:#}"));
                return summary;
            }
        }

        let subscriptions = self.subscriptions.snapshot();
        let mut pairs: Vec<(Bounty, String)> = Vec::new();
        for bounty in &fresh {
            if matcher::normalize_location(&bounty.location).is_empty() {
                counter!("bounties_unroutable_total").increment(1);
                tracing::info!(bounty = %bounty.id, "bounty has no usable location");
                summary.unroutable += 1;
                continue;
            }
            let destinations =
                matcher::matching_destinations(&bounty.location, &subscriptions, &self.wildcard);
            if destinations.is_empty() {
                summary.unmatched += 1;
                continue;
            }
            for destination_id in destinations {
                pairs.push((bounty.clone(), destination_id));
            }
        }
        summary.matched_pairs = pairs.len();

        for report in self.dispatcher.deliver_all(pairs).await {
            match report.outcome {
                DeliveryOutcome::Delivered => summary.delivered += 1,
                DeliveryOutcome::Failed(_) => summary.failed += 1,
                DeliveryOutcome::Rejected(_) => summary.rejected += 1,
            }
        }

        counter!("poll_cycles_total").increment(1);
        gauge!("poll_last_cycle_ts").set(started.timestamp().max(0) as f64);
        summary
    }
}
