//! Provider adapter implementations for Agora.
//!
//! This crate provides concrete implementations of the `ProviderAdapter` trait.
//!
//! # Supported Providers
//!
//! - **OpenAI**: GPT models (API key required)
//! - **Mistral**: OpenAI-compatible endpoint (API key required)
//! - **Groq**: OpenAI-compatible endpoint (API key required)
//! - **Anthropic**: Claude models (API key required)
//! - **Ollama**: Local models (no API key, base URL required)
//! - **Simulated**: Deterministic placeholder used when nothing is configured

pub mod anthropic;
pub mod credentials;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod simulated;

use reqwest::Client;
use std::time::Duration;

pub use anthropic::AnthropicAdapter;
pub use credentials::ProviderCredentials;
pub use ollama::OllamaAdapter;
pub use openai::OpenAIAdapter;
pub use registry::AdapterRegistry;
pub use simulated::simulated_reply;

/// Ceiling applied to every outbound provider request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Builds the shared HTTP client with the given request timeout.
pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_else(|_| Client::new())
}

/// Returns true when an HTTP status means the provider refused on quota grounds.
pub(crate) fn is_quota_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 402 || status.as_u16() == 429
}
