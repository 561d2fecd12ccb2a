// src/store/subscriptions.rs
//
// Registered destinations and their location subscriptions, persisted as one
// JSON document. The pipeline only reads a snapshot at match time; operator
// changes land between cycles. Original casing is kept for display, matching
// always goes through the normalized key.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::matcher::normalize_location;

/// A registered delivery target (a Discord channel) and the guild that owns
/// it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Destination {
    pub destination_id: String,
    pub scope_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub destination_id: String,
    pub location: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    destinations: Vec<Destination>,
    #[serde(default)]
    subscriptions: Vec<Subscription>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Same (destination, normalized location) already present.
    Duplicate,
    /// Subscriptions require a registered destination first.
    UnknownDestination,
    /// Location normalized to the empty string.
    EmptyLocation,
}

#[derive(Debug)]
pub struct SubscriptionStore {
    path: PathBuf,
    inner: Mutex<StoreState>,
}

impl SubscriptionStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = match fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing subscription store at {}", path.display()))?,
            Err(_) => StoreState::default(),
        };
        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    /// Upsert a destination. Returns true when newly created; an existing id
    /// has its scope updated instead.
    pub async fn register_destination(&self, destination: Destination) -> Result<bool> {
        let created = {
            let mut state = self.inner.lock().expect("subscription mutex poisoned");
            match state
                .destinations
                .iter_mut()
                .find(|d| d.destination_id == destination.destination_id)
            {
                Some(existing) => {
                    existing.scope_id = destination.scope_id;
                    false
                }
                None => {
                    state.destinations.push(destination);
                    true
                }
            }
        };
        self.persist().await?;
        Ok(created)
    }

    pub async fn add(&self, destination_id: &str, location: &str) -> Result<AddOutcome> {
        let key = normalize_location(location);
        let outcome = {
            let mut state = self.inner.lock().expect("subscription mutex poisoned");
            if key.is_empty() {
                AddOutcome::EmptyLocation
            } else if !state
                .destinations
                .iter()
                .any(|d| d.destination_id == destination_id)
            {
                AddOutcome::UnknownDestination
            } else if state.subscriptions.iter().any(|s| {
                s.destination_id == destination_id && normalize_location(&s.location) == key
            }) {
                AddOutcome::Duplicate
            } else {
                state.subscriptions.push(Subscription {
                    destination_id: destination_id.to_string(),
                    location: location.trim().to_string(),
                });
                AddOutcome::Added
            }
        };
        if outcome == AddOutcome::Added {
            self.persist().await?;
        }
        Ok(outcome)
    }

    /// Remove by normalized location. Returns whether anything was removed.
    pub async fn remove(&self, destination_id: &str, location: &str) -> Result<bool> {
        let key = normalize_location(location);
        let removed = {
            let mut state = self.inner.lock().expect("subscription mutex poisoned");
            let before = state.subscriptions.len();
            state.subscriptions.retain(|s| {
                !(s.destination_id == destination_id && normalize_location(&s.location) == key)
            });
            state.subscriptions.len() != before
        };
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Subscribed locations for one destination, original casing.
    pub fn list_for_destination(&self, destination_id: &str) -> Vec<String> {
        let state = self.inner.lock().expect("subscription mutex poisoned");
        state
            .subscriptions
            .iter()
            .filter(|s| s.destination_id == destination_id)
            .map(|s| s.location.clone())
            .collect()
    }

    /// The consistent read a cycle takes at the start of matching.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.inner
            .lock()
            .expect("subscription mutex poisoned")
            .subscriptions
            .clone()
    }

    pub fn destination_count(&self) -> usize {
        self.inner
            .lock()
            .expect("subscription mutex poisoned")
            .destinations
            .len()
    }

    pub fn has_destination(&self, destination_id: &str) -> bool {
        self.inner
            .lock()
            .expect("subscription mutex poisoned")
            .destinations
            .iter()
            .any(|d| d.destination_id == destination_id)
    }

    async fn persist(&self) -> Result<()> {
        let bytes = {
            let state = self.inner.lock().expect("subscription mutex poisoned");
            serde_json::to_vec_pretty(&*state).context("serializing subscription store")?
        };
        if let Some(dir) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(dir).await {
                tracing::warn!(error = %e, "creating state dir failed");
            }
        }
        fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("writing subscription store to {}", self.path.display()))
    }
}
