use anyhow::{Result, anyhow, bail};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::stream::{StreamEvent, StreamParser};

// ── Client ────────────────────────────────────────────────────────────────────

pub struct Client {
    http: reqwest::Client,
    pub endpoint: String,
    pub model: String,
    api_key: Option<String>,
    auth_required: bool,
}

impl Client {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            model,
            api_key: None,
            auth_required: false,
        }
    }

    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key);
    }

    /// When set, `chat` refuses to start a request without an API key.
    pub fn set_auth_required(&mut self, required: bool) {
        self.auth_required = required;
    }

    /// Run one streaming chat round: POST the transcript plus the tool
    /// schemas, feed the SSE byte stream through the parser, and hand every
    /// event to `on_event` in arrival order. Provider-reported in-stream
    /// errors and cancellation both surface as transport errors; the caller
    /// never sees a partial round as success.
    pub async fn chat(
        &self,
        messages: &Value,
        tools: &[Value],
        thinking: bool,
        cancel: &CancellationToken,
        mut on_event: impl FnMut(StreamEvent),
    ) -> Result<()> {
        if self.auth_required && self.api_key.is_none() {
            bail!("no API key configured for {} — set api_key in the profile", self.endpoint);
        }

        let mut body = json!({
            "model": self.model,
            "stream": true,
            "stream_options": {"include_usage": true},
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| json!({"type": "function", "function": t}))
                    .collect(),
            );
            body["tool_choice"] = json!("auto");
        }
        if thinking {
            body["thinking"] = json!({"type": "enabled"});
        }

        let url = format!("{}/v1/chat/completions", self.endpoint.trim_end_matches('/'));

        let mut req = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("API error {}: {}", status, text));
        }

        let mut stream = resp.bytes_stream();
        let mut parser = StreamParser::new();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => bail!("request cancelled"),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let bytes = chunk?;
            let raw = String::from_utf8_lossy(&bytes);
            for event in parser.feed(&raw) {
                if let StreamEvent::Error(message) = event {
                    bail!("provider error: {message}");
                }
                on_event(event);
            }
        }

        for event in parser.finish() {
            if let StreamEvent::Error(message) = event {
                bail!("provider error: {message}");
            }
            on_event(event);
        }

        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auth_required_without_key_fails_before_any_request() {
        let mut client = Client::new("https://api.example.com".to_string(), "m".to_string());
        client.set_auth_required(true);
        let cancel = CancellationToken::new();
        let err = client
            .chat(&json!([]), &[], false, &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no API key"));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_aborts_before_streaming() {
        // An unroutable endpoint: the request itself errors, but the point is
        // that a cancelled token never leaves events behind.
        let client = Client::new("http://127.0.0.1:1".to_string(), "m".to_string());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut saw_event = false;
        let result = client
            .chat(&json!([]), &[], false, &cancel, |_| saw_event = true)
            .await;
        assert!(result.is_err());
        assert!(!saw_event);
    }
}
