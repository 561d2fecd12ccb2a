// src/status.rs
//
// Operator-visible pipeline status: the last cycle's summary and the last
// error, kept in memory and served by the admin surface.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated outcome of one poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    /// Bounties returned by the source this cycle.
    pub fetched: usize,
    /// Bounties not present in the seen ledger.
    pub fresh: usize,
    /// (bounty, destination) pairs handed to the dispatcher.
    pub matched_pairs: usize,
    /// Fresh bounties with no usable location.
    pub unroutable: usize,
    /// Fresh bounties with a location nobody subscribes to.
    pub unmatched: usize,
    pub delivered: usize,
    /// Pairs that exhausted their transient-retry budget.
    pub failed: usize,
    /// Pairs permanently refused by the sink.
    pub rejected: usize,
    /// Set when the cycle aborted before dispatch (fetch or ledger failure).
    pub error: Option<String>,
}

impl CycleSummary {
    pub fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            fetched: 0,
            fresh: 0,
            matched_pairs: 0,
            unroutable: 0,
            unmatched: 0,
            delivered: 0,
            failed: 0,
            rejected: 0,
            error: None,
        }
    }

    pub fn attempted(&self) -> usize {
        self.delivered + self.failed + self.rejected
    }
}

#[derive(Debug, Default, Clone)]
struct StatusInner {
    cycles_run: u64,
    last_cycle: Option<CycleSummary>,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<StatusInner>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub cycles_run: u64,
    pub last_cycle: Option<CycleSummary>,
    pub last_error: Option<String>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self, summary: CycleSummary) {
        let mut inner = self.inner.lock().expect("status mutex poisoned");
        inner.cycles_run += 1;
        if let Some(err) = &summary.error {
            inner.last_error = Some(err.clone());
        }
        inner.last_cycle = Some(summary);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.lock().expect("status mutex poisoned");
        StatusSnapshot {
            cycles_run: inner.cycles_run,
            last_cycle: inner.last_cycle.clone(),
            last_error: inner.last_error.clone(),
        }
    }
}
