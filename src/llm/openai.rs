use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::llm::TextGenerator;

/// Chat-completions client. One request per call, bounded by the client timeout.
pub struct OpenAiTextGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiTextGenerator {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<Option<String>> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.7,
            "max_tokens": 300,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("text generator: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "text generator returned HTTP {}",
                status.as_u16()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("text generator body: {e}")))?;

        let content = v
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        debug!(
            "[LLM] model={} returned {} chars",
            self.model,
            content.as_ref().map_or(0, |c| c.len())
        );
        Ok(content)
    }
}
