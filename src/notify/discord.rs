// src/notify/discord.rs
//
// Discord channel-message sink. Destinations are channel ids; the message is
// a single embed. HTTP status classification drives the dispatcher's retry
// policy: 429 carries the wait from Discord's rate-limit body, 401/403/404
// are permanent rejections, 5xx and transport errors are transient.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{BountyAlert, DeliverError, NotifySink};

const API_BASE: &str = "https://discord.com/api/v10";
const EMBED_COLOR_GREEN: u32 = 0x57F287;
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

pub struct DiscordSink {
    token: String,
    api_base: String,
    client: Client,
    timeout: Duration,
}

impl DiscordSink {
    pub fn new(token: String) -> Self {
        Self {
            token,
            api_base: API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Point at a different API root (mock server in tests/tools).
    pub fn with_api_base(mut self, base: String) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn build_payload(alert: &BountyAlert) -> MessagePayload {
        let mut fields = vec![
            EmbedField {
                name: "Location".to_string(),
                value: alert.location.clone(),
                inline: true,
            },
            EmbedField {
                name: "Reward".to_string(),
                value: alert.reward.clone(),
                inline: true,
            },
        ];
        if let Some(deadline) = &alert.deadline {
            fields.push(EmbedField {
                name: "Deadline".to_string(),
                value: deadline.clone(),
                inline: true,
            });
        }
        if !alert.skills.is_empty() {
            fields.push(EmbedField {
                name: "Skills".to_string(),
                value: alert.skills.join(", "),
                inline: false,
            });
        }
        MessagePayload {
            embeds: vec![Embed {
                title: format!("\u{1F4B0} {}", alert.title),
                description: alert.description.clone(),
                url: alert.url.clone(),
                color: EMBED_COLOR_GREEN,
                timestamp: alert.posted_at.map(|t| t.to_rfc3339()),
                fields,
            }],
        }
    }
}

#[derive(Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Serialize)]
struct Embed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    fields: Vec<EmbedField>,
}

#[derive(Serialize)]
struct MessagePayload {
    embeds: Vec<Embed>,
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[async_trait::async_trait]
impl NotifySink for DiscordSink {
    async fn send(&self, destination_id: &str, alert: &BountyAlert) -> Result<(), DeliverError> {
        let url = format!("{}/channels/{}/messages", self.api_base, destination_id);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&Self::build_payload(alert))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .json::<RateLimitBody>()
                .await
                .ok()
                .map(|b| Duration::from_secs_f64(b.retry_after.max(0.0)))
                .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
            return Err(DeliverError::RateLimited { retry_after });
        }
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            return Err(DeliverError::Rejected(format!(
                "channel {destination_id}: status {status}"
            )));
        }
        match resp.error_for_status() {
            Ok(_) => Ok(()),
            Err(e) if status.is_server_error() => Err(DeliverError::Transient(e.to_string())),
            Err(e) => Err(DeliverError::Rejected(e.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_fields_and_skips_absent_ones() {
        let alert = BountyAlert {
            title: "Build a bot".into(),
            description: "desc".into(),
            location: "Remote".into(),
            reward: "$500".into(),
            url: Some("https://example.test/b/1".into()),
            deadline: None,
            skills: vec!["Rust".into(), "APIs".into()],
            posted_at: None,
        };
        let payload = DiscordSink::build_payload(&alert);
        let json = serde_json::to_value(&payload).unwrap();
        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], "\u{1F4B0} Build a bot");
        assert_eq!(embed["url"], "https://example.test/b/1");
        assert!(embed.get("timestamp").is_none());
        let names: Vec<&str> = embed["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Location", "Reward", "Skills"]);
    }
}
