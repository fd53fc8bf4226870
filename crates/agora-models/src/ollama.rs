//! Ollama adapter for locally hosted models.
//!
//! Ollama needs no credentials; it is considered configured as soon as a base URL is known.

use crate::{DEFAULT_HTTP_TIMEOUT, http_client};
use agora_abstraction::{
    ChatMessage, ModelError, ModelResponse, ModelUsage, ProviderAdapter, ProviderId,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Model served by the local provider when routing falls back to it.
pub const DEFAULT_LOCAL_MODEL: &str = "llama3";

/// Ollama adapter.
#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    /// The base URL for the Ollama API (e.g. "http://localhost:11434").
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OllamaAdapter {
    /// Creates an adapter pointed at the given Ollama server.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(DEFAULT_HTTP_TIMEOUT),
        }
    }

    /// Replaces the HTTP client with one using the given request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    async fn call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model = model,
            base_url = %self.base_url,
            message_count = messages.len(),
            "OllamaAdapter sending chat request"
        );

        let url = format!("{}/api/chat", self.base_url);
        let request_body = OllamaChatRequest {
            model: model.to_string(),
            messages: messages
                .iter()
                .map(|m| OllamaMessage { role: m.role.clone(), content: m.content.clone() })
                .collect(),
            stream: false,
            options: OllamaOptions { num_predict: max_tokens },
        };

        let response = self.client.post(&url).json(&request_body).send().await.map_err(|e| {
            error!(error = %e, base_url = %self.base_url, "Failed to connect to Ollama");
            if e.is_connect() {
                ModelError::RequestError(format!(
                    "Ollama server not reachable at {}. Start it with 'ollama serve'.",
                    self.base_url
                ))
            } else {
                ModelError::RequestError(format!("Network error: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Ollama API returned error status");

            if status.as_u16() == 404 {
                return Err(ModelError::ModelResponseError(format!(
                    "Model '{}' not found. Pull it with 'ollama pull {}'.",
                    model, model
                )));
            }
            return Err(ModelError::ModelResponseError(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Ollama response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        if let Some(err) = body.error {
            return Err(ModelError::ModelResponseError(err));
        }

        let content = body
            .message
            .map(|m| m.content)
            .ok_or_else(|| ModelError::ModelResponseError("No message in Ollama response".to_string()))?;

        Ok(ModelResponse {
            content,
            model_id: Some(model.to_string()),
            usage: Some(ModelUsage::new(
                body.prompt_eval_count.unwrap_or(0),
                body.eval_count.unwrap_or(0),
            )),
        })
    }

    fn provider(&self) -> ProviderId {
        ProviderId::Ollama
    }
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32, // max_tokens equivalent
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let adapter = OllamaAdapter::new("http://localhost:11434/");
        assert_eq!(adapter.base_url, "http://localhost:11434");
        assert_eq!(adapter.provider(), ProviderId::Ollama);
    }

    #[tokio::test]
    async fn test_call_reads_eval_counts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"stream": false, "options": {"num_predict": 64}}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{
                    "message": {"role": "assistant", "content": "local reply"},
                    "done": true,
                    "prompt_eval_count": 7,
                    "eval_count": 2
                }"#,
            )
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(server.url());
        let response = adapter.call(DEFAULT_LOCAL_MODEL, &[ChatMessage::user("hi")], 64).await.unwrap();

        assert_eq!(response.content, "local reply");
        assert_eq!(response.tokens_input(), 7);
        assert_eq!(response.tokens_output(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_model_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error": "model not found"}"#)
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(server.url());
        let err = adapter.call("mixtral", &[ChatMessage::user("hi")], 64).await.unwrap_err();

        assert!(err.to_string().contains("ollama pull mixtral"));
    }
}
