//! Provider abstraction layer for Agora.
//!
//! This crate defines the vocabulary shared by every model provider adapter:
//! the closed set of providers, chat messages, responses, usage statistics,
//! and the `ProviderAdapter` trait the execution core dispatches through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Represents an error that can occur when calling an external model provider.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// An error occurred during the API request (e.g., network issues, timeouts).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The provider returned an error status or an unusable body.
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The provider is not supported or not configured.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// Provider quota exceeded or provider-side rate limit hit.
    #[error("Provider '{provider}' quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// The provider name (e.g., "openai", "anthropic").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

/// The closed set of external model providers the core can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// OpenAI chat completions.
    OpenAI,
    /// Anthropic messages API.
    Anthropic,
    /// Mistral (OpenAI-compatible endpoint).
    Mistral,
    /// Groq (OpenAI-compatible endpoint).
    Groq,
    /// Local Ollama server; no API key, configured by base URL.
    Ollama,
}

impl ProviderId {
    /// Every provider, in the fixed priority order used for fallback routing.
    pub const ALL: [ProviderId; 5] = [
        ProviderId::OpenAI,
        ProviderId::Anthropic,
        ProviderId::Mistral,
        ProviderId::Groq,
        ProviderId::Ollama,
    ];

    /// Returns the lowercase wire name of the provider.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Mistral => "mistral",
            ProviderId::Groq => "groq",
            ProviderId::Ollama => "ollama",
        }
    }

    /// Whether this provider runs locally rather than behind a credentialed API.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, ProviderId::Ollama)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "mistral" => Ok(Self::Mistral),
            "groq" => Ok(Self::Groq),
            "ollama" | "local" => Ok(Self::Ollama),
            other => Err(ModelError::UnsupportedModelProvider(format!(
                "Unrecognized provider: {}",
                other
            ))),
        }
    }
}

/// Represents a message in a conversation with a chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender ("system", "user" or "assistant").
    pub role: String,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// The response from a chat completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated content.
    pub content: String,

    /// Optional: The ID of the model that served the request.
    pub model_id: Option<String>,

    /// Optional: Usage statistics for the request.
    pub usage: Option<ModelUsage>,
}

impl ModelResponse {
    /// Input tokens reported by the provider, zero if usage was not reported.
    #[must_use]
    pub fn tokens_input(&self) -> u32 {
        self.usage.as_ref().map_or(0, |u| u.prompt_tokens)
    }

    /// Output tokens reported by the provider, zero if usage was not reported.
    #[must_use]
    pub fn tokens_output(&self) -> u32 {
        self.usage.as_ref().map_or(0, |u| u.completion_tokens)
    }
}

/// Usage statistics for a model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,

    /// Number of tokens in the completion.
    pub completion_tokens: u32,

    /// Total number of tokens used.
    pub total_tokens: u32,
}

impl ModelUsage {
    /// Builds usage from prompt and completion counts.
    #[must_use]
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A uniform interface over one external model provider.
///
/// Adapters must be `Send + Sync` so a single instance can serve concurrent
/// dispatches for unrelated callers.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Sends a chat completion request to the provider.
    ///
    /// # Arguments
    /// * `model` - The provider-specific model ID
    /// * `messages` - The conversation, usually one system and one user message
    /// * `max_tokens` - Ceiling on generated tokens
    ///
    /// # Errors
    /// Returns a `ModelError` if the request fails or the response is unusable.
    async fn call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<ModelResponse, ModelError>;

    /// Returns the provider this adapter talks to.
    fn provider(&self) -> ProviderId;
}
