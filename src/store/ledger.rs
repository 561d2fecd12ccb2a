// src/store/ledger.rs
//
// Durable record of bounty ids that have already gone through a matching
// pass. "Seen" means observed in a fetch, not successfully delivered: the
// table is written before dispatch so delivery failures never replay a
// bounty as new. Ids are never removed; see DESIGN.md for the retention
// trade-off.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SeenRecord {
    bounty_id: String,
    first_seen_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SeenLedger {
    path: PathBuf,
    inner: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SeenLedger {
    /// Open the ledger at `path`, loading any existing table. A missing file
    /// is an empty ledger; an unreadable one is an error (silently starting
    /// fresh would redeliver everything).
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = match fs::read_to_string(&path).await {
            Ok(s) => {
                let rows: Vec<SeenRecord> = serde_json::from_str(&s)
                    .with_context(|| format!("parsing seen ledger at {}", path.display()))?;
                rows.into_iter()
                    .map(|r| (r.bounty_id, r.first_seen_at))
                    .collect()
            }
            Err(_) => HashMap::new(),
        };
        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    pub fn is_new(&self, bounty_id: &str) -> bool {
        !self
            .inner
            .lock()
            .expect("ledger mutex poisoned")
            .contains_key(bounty_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("ledger mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record ids as observed at `at`, then flush the table to disk before
    /// returning. Idempotent: an id already present keeps its original
    /// `first_seen_at` and re-marking is a no-op.
    pub async fn mark_seen<I, S>(&self, ids: I, at: DateTime<Utc>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bytes = {
            let mut map = self.inner.lock().expect("ledger mutex poisoned");
            for id in ids {
                map.entry(id.as_ref().to_string()).or_insert(at);
            }
            let mut rows: Vec<SeenRecord> = map
                .iter()
                .map(|(id, ts)| SeenRecord {
                    bounty_id: id.clone(),
                    first_seen_at: *ts,
                })
                .collect();
            rows.sort_by(|a, b| a.bounty_id.cmp(&b.bounty_id));
            serde_json::to_vec_pretty(&rows).context("serializing seen ledger")?
        };
        if let Some(dir) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(dir).await {
                tracing::warn!(error = %e, "creating ledger dir failed");
            }
        }
        fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("writing seen ledger to {}", self.path.display()))
    }
}
