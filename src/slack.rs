//! Slack incoming-webhook transport.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;

use crate::error::Result;
use crate::notify::{CollaboratorError, OutgoingMessage, Transport};

/// Response bodies are cut to this length in error reports.
const ERROR_BODY_PREVIEW_CHARS: usize = 240;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_emoji: Option<&'a str>,
}

/// Posts messages to a Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackWebhook {
    client: Client,
    url: String,
    username: Option<String>,
    icon_emoji: Option<String>,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            username: None,
            icon_emoji: None,
        })
    }

    /// Display name and emoji shown as the message sender.
    pub fn with_identity(mut self, username: Option<String>, icon_emoji: Option<String>) -> Self {
        self.username = username.filter(|u| !u.trim().is_empty());
        self.icon_emoji = icon_emoji.filter(|e| !e.trim().is_empty());
        self
    }
}

impl Transport for SlackWebhook {
    fn post(&self, message: &OutgoingMessage) -> std::result::Result<u16, CollaboratorError> {
        let payload = WebhookPayload {
            channel: &message.channel,
            text: &message.text,
            username: self.username.as_deref(),
            icon_emoji: self.icon_emoji.as_deref(),
        };

        let response = self.client.post(&self.url).json(&payload).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect(),
            });
        }
        Ok(status.as_u16())
    }
}
