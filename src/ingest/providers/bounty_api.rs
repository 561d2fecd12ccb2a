// src/ingest/providers/bounty_api.rs
//
// HTTP client for the upstream bounty API. The endpoint returns either a
// bare JSON array of bounties or an object wrapping the list under one of a
// few known keys; both shapes are accepted, anything else is a malformed
// (fatal) response for this cycle.

use std::time::Duration;

use metrics::{counter, histogram};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;

use crate::ingest::types::{Bounty, BountySource, FetchError};

const LIST_KEYS: [&str; 4] = ["bounties", "data", "results", "items"];
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

pub struct HttpBountyProvider {
    url: String,
    api_key: Option<String>,
    client: Client,
    timeout: Duration,
    per_page: u32,
}

impl HttpBountyProvider {
    pub fn new(url: String, api_key: Option<String>, timeout_secs: u64, per_page: u32) -> Self {
        Self {
            url,
            api_key,
            client: Client::new(),
            timeout: Duration::from_secs(timeout_secs),
            per_page: per_page.max(1),
        }
    }

    fn parse_body(body: &str) -> Result<Vec<Bounty>, FetchError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| FetchError::Malformed(format!("body is not JSON: {e}")))?;

        let list = match value {
            Value::Array(_) => value,
            Value::Object(ref map) => LIST_KEYS
                .iter()
                .find_map(|key| map.get(*key).cloned())
                .ok_or_else(|| {
                    let keys: Vec<&String> = map.keys().collect();
                    FetchError::Malformed(format!("no bounty list under known keys, got {keys:?}"))
                })?,
            _ => {
                return Err(FetchError::Malformed(
                    "expected a JSON array or object".to_string(),
                ))
            }
        };

        serde_json::from_value(list).map_err(|e| FetchError::Malformed(format!("bounty row: {e}")))
    }
}

#[async_trait::async_trait]
impl BountySource for HttpBountyProvider {
    async fn fetch_open(&self) -> Result<Vec<Bounty>, FetchError> {
        let mut request = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .header(header::ACCEPT, "application/json")
            .query(&[("page", "1".to_string()), ("per_page", self.per_page.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
            counter!("source_rate_limited_total").increment(1);
            return Err(FetchError::RateLimited { retry_after });
        }
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(FetchError::Unauthorized);
        }
        let resp = match resp.error_for_status() {
            Ok(resp) => resp,
            Err(e) if status.is_server_error() => return Err(FetchError::Transient(e.to_string())),
            Err(_) => {
                return Err(FetchError::Malformed(format!("unexpected status {status}")))
            }
        };

        let t0 = std::time::Instant::now();
        let body = resp.text().await?;
        let bounties = Self::parse_body(&body)?;
        histogram!("source_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("bounties_fetched_total").increment(bounties.len() as u64);
        Ok(bounties)
    }

    fn name(&self) -> &'static str {
        "bounty-api"
    }
}
