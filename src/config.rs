// src/config.rs
//
// Layered configuration: optional TOML file, then environment overrides.
// File resolution: $BOUNTY_CONFIG_PATH, else config/bounty-notifier.toml,
// else built-in defaults. `.env` is loaded by the binary before this runs.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::backoff::Backoff;

const ENV_CONFIG_PATH: &str = "BOUNTY_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/bounty-notifier.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source_url: String,
    pub source_api_key: Option<String>,
    pub discord_token: Option<String>,
    pub poll_interval_secs: u64,
    pub initial_delay_secs: u64,
    pub source_timeout_secs: u64,
    pub per_page: u32,
    pub max_fetch_attempts: u32,
    pub max_deliver_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub dispatch_concurrency: usize,
    pub wildcard_location: String,
    pub state_dir: PathBuf,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: "http://127.0.0.1:8000/bounties".to_string(),
            source_api_key: None,
            discord_token: None,
            poll_interval_secs: 60,
            initial_delay_secs: 5,
            source_timeout_secs: 10,
            per_page: 50,
            max_fetch_attempts: 3,
            max_deliver_attempts: 3,
            backoff_base_ms: 500,
            backoff_cap_ms: 10_000,
            dispatch_concurrency: 4,
            wildcard_location: "all".to_string(),
            state_dir: PathBuf::from("state"),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = match config_file_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config at {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("SOURCE_URL") {
            self.source_url = v;
        }
        if let Ok(v) = env::var("SOURCE_API_KEY") {
            self.source_api_key = Some(v);
        }
        if let Ok(v) = env::var("DISCORD_TOKEN") {
            self.discord_token = Some(v);
        }
        if let Some(v) = env_u64("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v;
        }
        if let Some(v) = env_u64("INITIAL_DELAY_SECS") {
            self.initial_delay_secs = v;
        }
        if let Some(v) = env_u64("SOURCE_TIMEOUT_SECS") {
            self.source_timeout_secs = v;
        }
        if let Some(v) = env_u64("PER_PAGE") {
            self.per_page = v as u32;
        }
        if let Some(v) = env_u64("MAX_FETCH_ATTEMPTS") {
            self.max_fetch_attempts = v as u32;
        }
        if let Some(v) = env_u64("MAX_DELIVER_ATTEMPTS") {
            self.max_deliver_attempts = v as u32;
        }
        if let Some(v) = env_u64("BACKOFF_BASE_MS") {
            self.backoff_base_ms = v;
        }
        if let Some(v) = env_u64("BACKOFF_CAP_MS") {
            self.backoff_cap_ms = v;
        }
        if let Some(v) = env_u64("DISPATCH_CONCURRENCY") {
            self.dispatch_concurrency = v as usize;
        }
        if let Ok(v) = env::var("WILDCARD_LOCATION") {
            self.wildcard_location = v;
        }
        if let Ok(v) = env::var("STATE_DIR") {
            self.state_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("BIND_ADDR") {
            self.bind_addr = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.source_url.trim().is_empty() {
            return Err(anyhow!("source_url must not be empty"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be positive"));
        }
        if self.max_fetch_attempts == 0 || self.max_deliver_attempts == 0 {
            return Err(anyhow!("retry attempt counts must be positive"));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(anyhow!("backoff_cap_ms must be >= backoff_base_ms"));
        }
        if self.dispatch_concurrency == 0 {
            return Err(anyhow!("dispatch_concurrency must be positive"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn fetch_backoff(&self) -> Backoff {
        Backoff::new(
            self.max_fetch_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
        )
    }

    pub fn deliver_backoff(&self) -> Backoff {
        Backoff::new(
            self.max_deliver_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
        )
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("seen_bounties.json")
    }

    pub fn subscriptions_path(&self) -> PathBuf {
        self.state_dir.join("subscriptions.json")
    }
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(p) = env::var(ENV_CONFIG_PATH) {
        return Some(PathBuf::from(p));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    default.exists().then_some(default)
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
