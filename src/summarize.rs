//! Action-text summarization through a generative-language API.
//!
//! Speaks the `models/{model}:generateContent` endpoint. Any failure
//! (transport, status, response shape) is returned as a
//! [`CollaboratorError`]; the notifier falls back to the raw text.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};

use crate::error::Result;
use crate::notify::{CollaboratorError, Summarizer};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_PROMPT: &str = "Format the following support ticket message clearly and \
concisely for a chat notification. Remove signatures, greetings boilerplate and quoted \
history. Keep the original language.";

/// Summarizer backed by the generateContent endpoint.
#[derive(Debug, Clone)]
pub struct GenerativeSummarizer {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    prompt: String,
}

impl GenerativeSummarizer {
    pub fn new(api_key: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

impl Summarizer for GenerativeSummarizer {
    fn summarize(&self, text: &str) -> std::result::Result<String, CollaboratorError> {
        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("{}\n\n{}", self.prompt, text) }]
            }]
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body: body.chars().take(240).collect(),
            });
        }

        let payload = response
            .json::<Value>()
            .map_err(|err| CollaboratorError::Malformed(err.to_string()))?;
        extract_text(&payload)
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(payload: &Value) -> std::result::Result<String, CollaboratorError> {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.pointer("/content/parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| CollaboratorError::Malformed("response has no candidate parts".to_string()))?;

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(CollaboratorError::Malformed(
            "candidate has no text".to_string(),
        ));
    }
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    #[test]
    fn returns_candidate_text() {
        let server = MockServer::start();
        let generate = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-2.0-flash:generateContent")
                .header("x-goog-api-key", "secret")
                .body_includes("segue retorno");
            then.status(200).json_body(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Retorno " }, { "text": "resumido." }] }
                }]
            }));
        });

        let summarizer = GenerativeSummarizer::new("secret", 2_000)
            .expect("client")
            .with_api_base(server.base_url());
        let summary = summarizer.summarize("Olá, segue retorno. Att, Ana").expect("summary");
        generate.assert_calls(1);
        assert_eq!(summary, "Retorno resumido.");
    }

    #[test]
    fn error_status_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(429).body("quota exceeded");
        });

        let summarizer = GenerativeSummarizer::new("secret", 2_000)
            .expect("client")
            .with_api_base(server.base_url());
        let err = summarizer.summarize("texto").expect_err("429");
        assert!(matches!(err, CollaboratorError::Status { status: 429, .. }));
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let payload = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(
            extract_text(&payload),
            Err(CollaboratorError::Malformed(_))
        ));
    }
}
