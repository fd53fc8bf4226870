//! Anthropic (Claude) adapter.
//!
//! Claude takes the system prompt in a dedicated `system` field rather than as a
//! message, so system messages are pulled out of the conversation before sending.

use crate::{DEFAULT_HTTP_TIMEOUT, http_client, is_quota_status};
use agora_abstraction::{
    ChatMessage, ModelError, ModelResponse, ModelUsage, ProviderAdapter, ProviderId,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl AnthropicAdapter {
    /// Creates a new adapter with the given API key.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            client: http_client(DEFAULT_HTTP_TIMEOUT),
        }
    }

    /// Overrides the base URL (used for proxies and tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Replaces the HTTP client with one using the given request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Concatenates all system messages; `None` when the conversation has none.
    fn extract_system_prompt(messages: &[ChatMessage]) -> Option<String> {
        let parts: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() { None } else { Some(parts.join("\n\n")) }
    }

    /// Anthropic signals overload and quota through the error `type` field as well as status.
    fn is_quota_body(error_text: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(error_text)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("type"))
                    .and_then(|t| t.as_str())
                    .map(|t| matches!(t, "rate_limit_error" | "overloaded_error" | "insufficient_quota"))
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model = model,
            message_count = messages.len(),
            max_tokens = max_tokens,
            "AnthropicAdapter sending messages request"
        );

        let url = format!("{}/messages", self.base_url);
        let request_body = MessagesRequest {
            model: model.to_string(),
            system: Self::extract_system_prompt(messages),
            messages: messages
                .iter()
                .filter(|m| m.role != "system")
                .map(|m| WireMessage {
                    role: if m.role == "assistant" { "assistant" } else { "user" }.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to Anthropic API");
                ModelError::RequestError(format!("Network error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Anthropic API returned error status");

            if is_quota_status(status) || Self::is_quota_body(&error_text) {
                return Err(ModelError::QuotaExceeded {
                    provider: ProviderId::Anthropic.to_string(),
                    message: Some(error_text),
                });
            }
            return Err(ModelError::ModelResponseError(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body: MessagesResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Anthropic API response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        let content: String = body
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if content.is_empty() {
            return Err(ModelError::ModelResponseError("No text content in API response".to_string()));
        }

        Ok(ModelResponse {
            content,
            model_id: Some(body.model.unwrap_or_else(|| model.to_string())),
            usage: body.usage.map(|u| ModelUsage::new(u.input_tokens, u.output_tokens)),
        })
    }

    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}
