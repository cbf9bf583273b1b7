/// Reasoning capability - run a prompt under a role, return text.
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::CapabilityError;

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Model identifier; part of the cache fingerprint.
    fn model_version(&self) -> &str;

    async fn invoke(&self, prompt: &str, role_context: &str) -> Result<String, CapabilityError>;
}

#[derive(Debug, Clone)]
pub struct AnthropicReasoning {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    endpoint: String,
}

impl AnthropicReasoning {
    pub fn new(
        api_key: String,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CapabilityError::Other(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_key,
            model,
            max_tokens: max_tokens.max(1),
            endpoint: ANTHROPIC_MESSAGES_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ReasoningEngine for AnthropicReasoning {
    fn model_version(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str, role_context: &str) -> Result<String, CapabilityError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": role_context,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| CapabilityError::classify(format!("reasoning request failed: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| CapabilityError::classify(format!("reasoning response unreadable: {err}")))?;
        if !status.is_success() {
            return Err(CapabilityError::from_status(status.as_u16(), &text));
        }

        let parsed: MessagesResponse = serde_json::from_str(&text)
            .map_err(|err| CapabilityError::Other(format!("invalid reasoning response: {err}")))?;
        extract_text(parsed)
    }
}

fn extract_text(response: MessagesResponse) -> Result<String, CapabilityError> {
    let out = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");

    let trimmed = out.trim();
    if trimmed.is_empty() {
        return Err(CapabilityError::Other(
            "reasoning engine did not produce textual output".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Stand-in used when live capabilities are not configured (test mode).
#[derive(Debug, Clone, Default)]
pub struct DisconnectedReasoning;

impl DisconnectedReasoning {
    pub const MODEL_VERSION: &'static str = "disconnected";
}

#[async_trait]
impl ReasoningEngine for DisconnectedReasoning {
    fn model_version(&self) -> &str {
        Self::MODEL_VERSION
    }

    async fn invoke(&self, _prompt: &str, _role_context: &str) -> Result<String, CapabilityError> {
        Err(CapabilityError::NotConfigured(
            "reasoning engine is not configured; set ANTHROPIC_API_KEY".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_joins_text_blocks_only() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "Financial Metrics:" },
                { "type": "tool_use", "id": "t1" },
                { "type": "text", "text": "- Revenue: $1B\n" }
            ]
        }))
        .expect("response should parse");
        assert_eq!(
            extract_text(parsed).expect("text should extract"),
            "Financial Metrics:\n- Revenue: $1B"
        );
    }

    #[test]
    fn extract_text_rejects_empty_output() {
        let parsed: MessagesResponse =
            serde_json::from_value(json!({ "content": [] })).expect("response should parse");
        assert!(matches!(
            extract_text(parsed),
            Err(CapabilityError::Other(_))
        ));
    }

    #[tokio::test]
    async fn disconnected_engine_always_fails() {
        let engine = DisconnectedReasoning;
        assert!(engine.invoke("prompt", "role").await.is_err());
    }
}
