//! Outcome reporting
//!
//! The runner builds a [`BotEvent`] per terminal outcome and hands it to a
//! [`Notifier`]. Delivery is best effort: the runner sends each event from
//! its own task, bounds it with a timeout and only logs failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Trade,
    Error,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotEvent {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub bot_name: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl BotEvent {
    pub fn new(kind: EventKind, bot_name: &str, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            bot_name: bot_name.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn trade(bot_name: &str, payload: serde_json::Value) -> Self {
        Self::new(EventKind::Trade, bot_name, payload)
    }

    pub fn error(bot_name: &str, payload: serde_json::Value) -> Self {
        Self::new(EventKind::Error, bot_name, payload)
    }

    pub fn heartbeat(bot_name: &str, payload: serde_json::Value) -> Self {
        Self::new(EventKind::Heartbeat, bot_name, payload)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &BotEvent) -> anyhow::Result<()>;
}

/// Identity attached to every webhook delivery
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub bot_secret: String,
    pub display_name: String,
    pub avatar_url: String,
    pub bio: Option<String>,
    pub wallet_address: Option<String>,
    pub timeout_secs: u64,
    /// Waits before each retry; its length is the retry count
    pub retry_delays: Vec<Duration>,
}

impl WebhookConfig {
    pub fn new(url: &str, bot_secret: &str, display_name: &str) -> Self {
        Self {
            url: url.to_string(),
            bot_secret: bot_secret.to_string(),
            display_name: display_name.to_string(),
            avatar_url: "/default-avatar.png".to_string(),
            bio: None,
            wallet_address: None,
            timeout_secs: 10,
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
            ],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookBody<'a> {
    #[serde(flatten)]
    event: &'a BotEvent,
    display_name: &'a str,
    avatar_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bio: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wallet_address: Option<&'a str>,
    bot_secret: &'a str,
}

/// JSON POST to an HTTP endpoint with a short retry schedule of its own
#[derive(Clone)]
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if config.bot_secret == "dev" {
            info!("Webhook for {} using dev secret", config.display_name);
        }

        Ok(Self { config, client })
    }

    async fn post_once(&self, body: &WebhookBody<'_>) -> anyhow::Result<()> {
        let response = self.client.post(&self.config.url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(100).collect();
            anyhow::bail!("Webhook returned HTTP {}: {}", status, snippet);
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &BotEvent) -> anyhow::Result<()> {
        let body = WebhookBody {
            event,
            display_name: &self.config.display_name,
            avatar_url: &self.config.avatar_url,
            bio: self.config.bio.as_deref(),
            wallet_address: self.config.wallet_address.as_deref(),
            bot_secret: &self.config.bot_secret,
        };

        let mut last_error = None;
        for attempt in 0..=self.config.retry_delays.len() {
            if attempt > 0 {
                let delay = self.config.retry_delays[attempt - 1];
                debug!(
                    "Webhook retry {}/{} in {:?}",
                    attempt,
                    self.config.retry_delays.len(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.post_once(&body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt == 0 {
                        warn!("Webhook delivery failed: {}", e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Webhook delivery failed")))
    }
}

/// Writes events to the log; used when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &BotEvent) -> anyhow::Result<()> {
        info!(
            kind = ?event.kind,
            bot = %event.bot_name,
            "{}",
            serde_json::to_string(&event.payload)?
        );
        Ok(())
    }
}
