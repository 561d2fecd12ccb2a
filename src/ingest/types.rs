// src/ingest/types.rs
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One upstream bounty posting. Immutable once fetched; the upstream `id` is
/// the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bounty {
    /// Missing upstream ids deserialize to "" and are skipped (with a log
    /// line) by the pipeline rather than failing the whole fetch.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub reward: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub skills: Vec<String>,
}

// Upstream serializes ids and rewards as strings or numbers depending on the
// deployment; accept both.
fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        S(String),
        N(serde_json::Number),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::S(s) => s,
        Raw::N(n) => n.to_string(),
    })
}

fn opt_string_or_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        S(String),
        N(serde_json::Number),
    }
    Ok(Option::<Raw>::deserialize(de)?.map(|r| match r {
        Raw::S(s) => s,
        Raw::N(n) => n.to_string(),
    }))
}

// RFC 3339 preferred; naive `YYYY-MM-DDTHH:MM:SS[.f]` (as the original feed
// emits) is read as UTC. Anything else degrades to None rather than failing
// the whole fetch.
fn flexible_timestamp<'de, D>(de: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Failure taxonomy for one fetch of the bounty list.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transient source error: {0}")]
    Transient(String),
    #[error("source rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("source authentication rejected")]
    Unauthorized,
    #[error("malformed source response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Transient and rate-limit failures may be retried within the cycle's
    /// attempt budget; the rest abort the cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transient(_) | FetchError::RateLimited { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transient(e.to_string())
    }
}

#[async_trait::async_trait]
pub trait BountySource: Send + Sync {
    /// Fetch the current list of open bounties. No side effects.
    async fn fetch_open(&self) -> Result<Vec<Bounty>, FetchError>;
    fn name(&self) -> &'static str;
}
