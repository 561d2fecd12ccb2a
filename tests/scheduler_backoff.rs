// tests/scheduler_backoff.rs
//
// Fetch retry bounds and the poll loop: a source that never recovers cannot
// wedge the scheduler, and shutdown stops new cycles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bounty_notifier::backoff::Backoff;
use bounty_notifier::ingest::scheduler::{spawn_poller, SchedulerCfg};
use bounty_notifier::ingest::types::{Bounty, BountySource, FetchError};
use bounty_notifier::ingest::{fetch_with_retry, Pipeline};
use bounty_notifier::notify::dispatcher::Dispatcher;
use bounty_notifier::notify::{BountyAlert, DeliverError, NotifySink};
use bounty_notifier::status::StatusBoard;
use bounty_notifier::store::ledger::SeenLedger;
use bounty_notifier::store::subscriptions::SubscriptionStore;
use tokio::sync::watch;

struct FlakySource {
    calls: AtomicUsize,
    /// Errors returned before the source starts succeeding; `usize::MAX`
    /// means it never recovers.
    failures_before_success: usize,
    rate_limited: bool,
}

#[async_trait]
impl BountySource for FlakySource {
    async fn fetch_open(&self) -> Result<Vec<Bounty>, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            if self.rate_limited {
                return Err(FetchError::RateLimited {
                    retry_after: Duration::from_millis(5),
                });
            }
            return Err(FetchError::Transient("connect timeout".to_string()));
        }
        Ok(vec![])
    }
    fn name(&self) -> &'static str {
        "flaky"
    }
}

struct NullSink;

#[async_trait]
impl NotifySink for NullSink {
    async fn send(&self, _destination_id: &str, _alert: &BountyAlert) -> Result<(), DeliverError> {
        Ok(())
    }
    fn name(&self) -> &'static str {
        "null"
    }
}

fn tiny_backoff(max_attempts: u32) -> Backoff {
    Backoff::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4))
}

async fn pipeline_for(dir: &tempfile::TempDir, source: Arc<FlakySource>) -> Pipeline {
    let ledger = Arc::new(SeenLedger::open(dir.path().join("seen.json")).await.unwrap());
    let subscriptions = Arc::new(
        SubscriptionStore::open(dir.path().join("subs.json"))
            .await
            .unwrap(),
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(NullSink), 2, tiny_backoff(3)));
    Pipeline::new(
        source,
        ledger,
        subscriptions,
        dispatcher,
        tiny_backoff(3),
        "all".to_string(),
    )
}

#[tokio::test]
async fn transient_failures_stop_at_the_attempt_budget() {
    let source = FlakySource {
        calls: AtomicUsize::new(0),
        failures_before_success: usize::MAX,
        rate_limited: false,
    };
    let err = fetch_with_retry(&source, &tiny_backoff(3)).await.unwrap_err();
    assert!(matches!(err, FetchError::Transient(_)));
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn fatal_errors_are_not_retried() {
    struct FatalSource {
        calls: AtomicUsize,
    }
    #[async_trait]
    impl BountySource for FatalSource {
        async fn fetch_open(&self) -> Result<Vec<Bounty>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Unauthorized)
        }
        fn name(&self) -> &'static str {
            "fatal"
        }
    }

    let source = FatalSource {
        calls: AtomicUsize::new(0),
    };
    let err = fetch_with_retry(&source, &tiny_backoff(3)).await.unwrap_err();
    assert!(matches!(err, FetchError::Unauthorized));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limited_fetch_recovers_within_budget() {
    let source = FlakySource {
        calls: AtomicUsize::new(0),
        failures_before_success: 1,
        rate_limited: true,
    };
    let out = fetch_with_retry(&source, &tiny_backoff(3)).await.unwrap();
    assert!(out.is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failing_cycles_do_not_block_later_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FlakySource {
        calls: AtomicUsize::new(0),
        failures_before_success: usize::MAX,
        rate_limited: false,
    });
    let pipeline = Arc::new(pipeline_for(&dir, source.clone()).await);
    let status = Arc::new(StatusBoard::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = spawn_poller(
        SchedulerCfg {
            interval: Duration::from_millis(25),
            initial_delay: Duration::ZERO,
        },
        pipeline,
        status.clone(),
        shutdown_rx,
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), poller)
        .await
        .expect("poller drains promptly")
        .unwrap();

    let snap = status.snapshot();
    assert!(snap.cycles_run >= 2, "got {} cycles", snap.cycles_run);
    assert!(snap.last_error.is_some());
    // Every recorded cycle aborted with the transient-source error.
    assert!(snap
        .last_cycle
        .as_ref()
        .and_then(|c| c.error.as_deref())
        .unwrap_or("")
        .contains("transient"));
}

#[tokio::test]
async fn shutdown_before_first_tick_runs_no_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FlakySource {
        calls: AtomicUsize::new(0),
        failures_before_success: 0,
        rate_limited: false,
    });
    let pipeline = Arc::new(pipeline_for(&dir, source.clone()).await);
    let status = Arc::new(StatusBoard::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = spawn_poller(
        SchedulerCfg {
            interval: Duration::from_millis(25),
            initial_delay: Duration::from_millis(100),
        },
        pipeline,
        status.clone(),
        shutdown_rx,
    );

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), poller)
        .await
        .expect("poller exits without waiting for a tick")
        .unwrap();

    assert_eq!(status.snapshot().cycles_run, 0);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}
