//! Webhook notifications for run lifecycle moments.
//!
//! Payload shape is picked from the webhook host (Discord embeds, Slack
//! attachments, or a plain `{title, message}` body) unless the configuration
//! forces one. Delivery failures are logged and reported as `false`; they never
//! surface as errors to the caller.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::NotificationConfig;
use crate::constants::colors;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook returned non-success status: {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Discord,
    Slack,
    Generic,
}

impl WebhookKind {
    /// Explicit override wins; `auto` (or anything unknown) falls back to URL detection.
    #[must_use]
    pub fn classify(url: &str, override_mode: &str) -> Self {
        match override_mode.to_ascii_lowercase().as_str() {
            "discord" => Self::Discord,
            "slack" => Self::Slack,
            "generic" => Self::Generic,
            _ => Self::detect(url),
        }
    }

    #[must_use]
    pub fn detect(url: &str) -> Self {
        if url.contains("discord.com") || url.contains("discordapp.com") {
            Self::Discord
        } else if url.contains("hooks.slack.com") {
            Self::Slack
        } else {
            Self::Generic
        }
    }

    #[must_use]
    pub fn payload(self, title: &str, message: &str, is_error: bool) -> Value {
        match self {
            Self::Discord => json!({
                "embeds": [{
                    "title": format!("**{title}**"),
                    "description": message,
                    "color": if is_error { colors::DISCORD_ERROR } else { colors::DISCORD_SUCCESS },
                }]
            }),
            Self::Slack => json!({
                "attachments": [{
                    "fallback": format!("{title}: {message}"),
                    "color": if is_error { colors::SLACK_ERROR } else { colors::SLACK_SUCCESS },
                    "title": title,
                    "text": message,
                }]
            }),
            Self::Generic => json!({
                "title": title,
                "message": message,
            }),
        }
    }
}

/// Outbound transport for webhook payloads.
#[async_trait]
pub trait WebhookGateway: Send + Sync {
    async fn deliver(&self, url: &str, payload: &Value) -> Result<(), NotifyError>;
}

/// JSON POST with a short timeout and no retries.
pub struct HttpWebhookGateway {
    client: reqwest::Client,
}

impl HttpWebhookGateway {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("Subtitlarr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build webhook HTTP client: {e}"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookGateway for HttpWebhookGateway {
    async fn deliver(&self, url: &str, payload: &Value) -> Result<(), NotifyError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Lifecycle moment a notification is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Started,
    Completed { message: String },
    Failed { error: String },
    Test,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    gateway: Arc<dyn WebhookGateway>,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(gateway: Arc<dyn WebhookGateway>) -> Self {
        Self { gateway }
    }

    /// Builds the payload for `webhook_url` and hands it to the gateway.
    pub async fn notify(
        &self,
        webhook_url: &str,
        webhook_type: &str,
        message: &str,
        title: &str,
        is_error: bool,
    ) -> bool {
        if webhook_url.trim().is_empty() {
            warn!("Webhook URL is not configured. Skipping notification.");
            return false;
        }

        let kind = WebhookKind::classify(webhook_url, webhook_type);
        let payload = kind.payload(title, message, is_error);

        match self.gateway.deliver(webhook_url, &payload).await {
            Ok(()) => {
                info!(event = "notification_sent", kind = ?kind, "Sent webhook notification");
                metrics::counter!("notifications_sent_total", "outcome" => "delivered").increment(1);
                true
            }
            Err(e) => {
                warn!(event = "notification_failed", error = %e, "Failed to send webhook notification");
                metrics::counter!("notifications_sent_total", "outcome" => "failed").increment(1);
                false
            }
        }
    }

    /// Applies the enable/selection flags for `moment`; returns whether a
    /// notification was delivered.
    pub async fn lifecycle(&self, config: &NotificationConfig, moment: Lifecycle) -> bool {
        if !config.enabled {
            return false;
        }

        let (message, is_error) = match moment {
            Lifecycle::Started if config.notify_on_start => {
                ("Subtitle scan and download started.".to_string(), false)
            }
            Lifecycle::Completed { message } if config.notify_on_completion => (message, false),
            Lifecycle::Failed { error } if config.notify_on_errors => {
                let message = if config.include_errors {
                    format!("Subtitle run failed: {error}")
                } else {
                    "Subtitle run failed.".to_string()
                };
                (message, true)
            }
            Lifecycle::Test => (
                "This is a test notification from Subtitlarr!".to_string(),
                false,
            ),
            _ => return false,
        };

        self.notify(
            &config.webhook_url,
            &config.webhook_type,
            &message,
            &config.title,
            is_error,
        )
        .await
    }
}
