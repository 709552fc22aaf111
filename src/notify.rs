//! Notification decisions and formatting
//!
//! The [`Notifier`] turns a [`ChangeEvent`] into a chat message, runs the
//! action text through a [`Summarizer`], picks the destination channel, and
//! hands the message to a [`Transport`]. Nothing here is fatal: summarizer
//! failures fall back to the raw text, and transport failures are logged
//! and reported as [`NotifyOutcome::Failed`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::{ChangeEvent, ChangeKind};

/// Failure of an external collaborator (summarizer or chat transport).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        CollaboratorError::Request(err.to_string())
    }
}

/// Rewrites raw action text into something readable in chat.
pub trait Summarizer {
    fn summarize(&self, text: &str) -> Result<String, CollaboratorError>;
}

/// Returns the text unchanged; used when no summarizer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Summarizer for Passthrough {
    fn summarize(&self, text: &str) -> Result<String, CollaboratorError> {
        Ok(text.to_string())
    }
}

/// A message ready to post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
}

/// Delivers messages to the chat service.
pub trait Transport {
    /// Post a message, returning the HTTP status on success.
    fn post(&self, message: &OutgoingMessage) -> Result<u16, CollaboratorError>;
}

/// Customer name to channel overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    routes: BTreeMap<String, String>,
}

impl RoutingTable {
    pub fn new(routes: BTreeMap<String, String>) -> Self {
        let routes = routes
            .into_iter()
            .map(|(customer, channel)| (customer.trim().to_string(), channel.trim().to_string()))
            .filter(|(customer, channel)| !customer.is_empty() && !channel.is_empty())
            .collect();
        Self { routes }
    }

    /// Parse a JSON object of `customer -> channel`.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let routes: BTreeMap<String, String> = serde_json::from_str(raw)?;
        Ok(Self::new(routes))
    }

    /// Parse a JSON object, degrading to an empty table on malformed input.
    pub fn from_json_lenient(raw: &str, source: &str) -> Self {
        match Self::from_json(raw) {
            Ok(table) => table,
            Err(err) => {
                tracing::error!(%source, error = %err, "malformed channel routing, ignoring it");
                Self::default()
            }
        }
    }

    pub fn routes(&self) -> &BTreeMap<String, String> {
        &self.routes
    }

    pub fn channel_for(&self, customer: &str) -> Option<&str> {
        self.routes.get(customer.trim()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// What happened to one event at the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Sent { channel: String, status: u16 },
    /// Internal author; nothing was sent.
    Suppressed,
    /// No routed or default channel; nothing was sent.
    NoChannel,
    Failed { channel: String, reason: String },
}

impl NotifyOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, NotifyOutcome::Sent { .. })
    }
}

/// Formats and dispatches change notifications.
pub struct Notifier<'a> {
    summarizer: &'a dyn Summarizer,
    transport: &'a dyn Transport,
    routing: &'a RoutingTable,
    default_channel: Option<String>,
    fallback_max_chars: usize,
}

impl<'a> Notifier<'a> {
    pub fn new(
        summarizer: &'a dyn Summarizer,
        transport: &'a dyn Transport,
        routing: &'a RoutingTable,
    ) -> Self {
        Self {
            summarizer,
            transport,
            routing,
            default_channel: None,
            fallback_max_chars: 0,
        }
    }

    pub fn with_default_channel(mut self, channel: Option<String>) -> Self {
        self.default_channel = channel
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }

    /// Truncate raw text to this many characters when summarization fails.
    /// Zero keeps the raw text whole.
    pub fn with_fallback_max_chars(mut self, max_chars: usize) -> Self {
        self.fallback_max_chars = max_chars;
        self
    }

    /// Channel for a customer: routed, then default.
    pub fn resolve_channel(&self, customer: &str) -> Option<String> {
        self.routing
            .channel_for(customer)
            .map(str::to_string)
            .or_else(|| self.default_channel.clone())
    }

    /// Notify about one event. Never fails; the outcome says what happened.
    pub fn notify(&self, event: &ChangeEvent) -> NotifyOutcome {
        let ticket = &event.ticket.id;
        if event.suppressed {
            tracing::info!(
                ticket = %ticket,
                author = event.action.author_display(),
                "internal author, notification suppressed"
            );
            return NotifyOutcome::Suppressed;
        }

        let Some(channel) = self.resolve_channel(&event.ticket.customer) else {
            tracing::error!(
                ticket = %ticket,
                customer = %event.ticket.customer,
                "no channel routed and no default channel configured, skipping notification"
            );
            return NotifyOutcome::NoChannel;
        };

        let body = self.summarize(ticket, &event.action.text);
        let message = OutgoingMessage {
            channel: channel.clone(),
            text: format_message(event, &body),
        };

        match self.transport.post(&message) {
            Ok(status) => {
                tracing::info!(ticket = %ticket, %channel, kind = ?event.kind, "notification sent");
                NotifyOutcome::Sent { channel, status }
            }
            Err(err) => {
                tracing::error!(ticket = %ticket, %channel, error = %err, "notification failed");
                NotifyOutcome::Failed {
                    channel,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn summarize(&self, ticket: &str, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        match self.summarizer.summarize(text) {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => {
                tracing::warn!(%ticket, "summarizer returned empty text, using raw action text");
                truncate_chars(text, self.fallback_max_chars)
            }
            Err(err) => {
                tracing::warn!(%ticket, error = %err, "summarizer failed, using raw action text");
                truncate_chars(text, self.fallback_max_chars)
            }
        }
    }
}

/// Header line per change kind.
pub fn headline(kind: ChangeKind, ticket_id: &str) -> String {
    match kind {
        ChangeKind::New => format!(":new: *New ticket #{ticket_id}*"),
        ChangeKind::Updated => format!(":arrows_counterclockwise: *Ticket #{ticket_id} updated*"),
        ChangeKind::Closed => format!(":white_check_mark: *Ticket #{ticket_id} closed*"),
    }
}

/// Render the chat text for an event, with `body` as the action text.
pub fn format_message(event: &ChangeEvent, body: &str) -> String {
    let ticket = &event.ticket;
    let mut lines = vec![headline(event.kind, &ticket.id)];
    lines.push(format!("*Subject:* {}", or_dash(&ticket.subject)));
    lines.push(format!("*Assignee:* {}", or_dash(&ticket.assignee)));
    lines.push(format!("*Customer:* {}", or_dash(&ticket.customer)));
    lines.push(format!(
        "*Status:* {}",
        or_dash(&crate::status::normalize_status(&ticket.status))
    ));

    let mut attribution = event.action.author_display().to_string();
    if let Some(date) = event.action.date.as_deref() {
        attribution.push_str(", ");
        attribution.push_str(date);
    }
    lines.push(format!("*Last action* ({attribution}):"));
    lines.push(if body.trim().is_empty() {
        "_no action text_".to_string()
    } else {
        body.to_string()
    });

    lines.join("\n")
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value.trim()
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
