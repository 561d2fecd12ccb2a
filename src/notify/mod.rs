// src/notify/mod.rs
pub mod discord;
pub mod dispatcher;

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::ingest::types::Bounty;

const DESCRIPTION_LIMIT: usize = 500;
const SKILLS_SHOWN: usize = 5;

/// Formatted notification payload handed to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct BountyAlert {
    pub title: String,
    pub description: String,
    pub location: String,
    pub reward: String,
    pub url: Option<String>,
    pub deadline: Option<String>,
    pub skills: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl BountyAlert {
    pub fn from_bounty(bounty: &Bounty) -> Self {
        let mut description = bounty.description.clone();
        if description.chars().count() > DESCRIPTION_LIMIT {
            description = description
                .chars()
                .take(DESCRIPTION_LIMIT - 3)
                .collect::<String>()
                + "...";
        }
        Self {
            title: if bounty.title.is_empty() {
                "New bounty".to_string()
            } else {
                bounty.title.clone()
            },
            description,
            location: bounty.location.clone(),
            reward: bounty
                .reward
                .clone()
                .unwrap_or_else(|| "Not specified".to_string()),
            url: bounty.url.clone(),
            deadline: bounty.deadline.clone(),
            skills: bounty.skills.iter().take(SKILLS_SHOWN).cloned().collect(),
            posted_at: bounty.posted_at,
        }
    }
}

/// Failure taxonomy for one delivery attempt to one destination.
#[derive(Debug, thiserror::Error)]
pub enum DeliverError {
    #[error("transient sink error: {0}")]
    Transient(String),
    #[error("destination rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("destination rejected delivery: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for DeliverError {
    fn from(e: reqwest::Error) -> Self {
        DeliverError::Transient(e.to_string())
    }
}

#[async_trait::async_trait]
pub trait NotifySink: Send + Sync {
    /// One outbound message per successful call; implementations must not
    /// duplicate a send that already succeeded.
    async fn send(&self, destination_id: &str, alert: &BountyAlert) -> Result<(), DeliverError>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_descriptions_are_truncated_with_ellipsis() {
        let bounty = Bounty {
            id: "b1".into(),
            title: String::new(),
            description: "x".repeat(600),
            location: "Remote".into(),
            reward: None,
            url: None,
            deadline: None,
            posted_at: None,
            skills: (0..8).map(|i| format!("skill-{i}")).collect(),
        };
        let alert = BountyAlert::from_bounty(&bounty);
        assert_eq!(alert.description.chars().count(), 500);
        assert!(alert.description.ends_with("..."));
        assert_eq!(alert.title, "New bounty");
        assert_eq!(alert.reward, "Not specified");
        assert_eq!(alert.skills.len(), 5);
    }
}
