//! OpenAI-compatible chat completions adapter.
//!
//! OpenAI, Mistral and Groq all expose the same `/chat/completions` contract,
//! so one adapter serves all three; only the base URL and provider tag differ.

use crate::{DEFAULT_HTTP_TIMEOUT, http_client, is_quota_status};
use agora_abstraction::{
    ChatMessage, ModelError, ModelResponse, ModelUsage, ProviderAdapter, ProviderId,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Adapter for any provider speaking the OpenAI chat completions protocol.
#[derive(Debug, Clone)]
pub struct OpenAIAdapter {
    /// Which provider this instance is billed and routed as.
    provider: ProviderId,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the API (without the `/chat/completions` suffix).
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OpenAIAdapter {
    /// Creates an adapter for OpenAI itself.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self::for_provider(ProviderId::OpenAI, OPENAI_BASE_URL, api_key)
    }

    /// Creates an adapter for Mistral's OpenAI-compatible endpoint.
    #[must_use]
    pub fn mistral(api_key: String) -> Self {
        Self::for_provider(ProviderId::Mistral, MISTRAL_BASE_URL, api_key)
    }

    /// Creates an adapter for Groq's OpenAI-compatible endpoint.
    #[must_use]
    pub fn groq(api_key: String) -> Self {
        Self::for_provider(ProviderId::Groq, GROQ_BASE_URL, api_key)
    }

    fn for_provider(provider: ProviderId, base_url: &str, api_key: String) -> Self {
        Self {
            provider,
            api_key,
            base_url: base_url.to_string(),
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

    fn map_error_status(&self, status: reqwest::StatusCode, error_text: String) -> ModelError {
        if is_quota_status(status) {
            return ModelError::QuotaExceeded {
                provider: self.provider.to_string(),
                message: Some(error_text),
            };
        }
        ModelError::ModelResponseError(format!("API error ({}): {}", status, error_text))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIAdapter {
    async fn call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            provider = %self.provider,
            model = model,
            message_count = messages.len(),
            max_tokens = max_tokens,
            "OpenAIAdapter sending chat completion"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let request_body = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages
                .iter()
                .map(|m| WireMessage { role: m.role.clone(), content: m.content.clone() })
                .collect(),
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.provider, error = %e, "Failed to send chat completion request");
                ModelError::RequestError(format!("Network error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = %self.provider,
                status = %status,
                error = %error_text,
                "Chat completion returned error status"
            );
            return Err(self.map_error_status(status, error_text));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!(provider = %self.provider, error = %e, "Failed to parse chat completion response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::ModelResponseError("No content in API response".to_string()))?;

        let usage = body.usage.map(|u| ModelUsage::new(u.prompt_tokens, u.completion_tokens));

        Ok(ModelResponse { content, model_id: Some(body.model.unwrap_or_else(|| model.to_string())), usage })
    }

    fn provider(&self) -> ProviderId {
        self.provider
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)] // Matches API naming
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
