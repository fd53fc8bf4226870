//! Credential presence per provider.
//!
//! Presence is a local, synchronous check: an API key (or, for the local
//! provider, a base URL) is either configured or it is not.

use agora_abstraction::ProviderId;
use serde::{Deserialize, Serialize};
use std::env;

/// Provider credentials supplied by configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    /// OpenAI API key.
    #[serde(default)]
    pub openai_api_key: Option<String>,
    /// Anthropic API key.
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    /// Mistral API key.
    #[serde(default)]
    pub mistral_api_key: Option<String>,
    /// Groq API key.
    #[serde(default)]
    pub groq_api_key: Option<String>,
    /// Base URL of a local Ollama server.
    #[serde(default)]
    pub ollama_base_url: Option<String>,
}

impl ProviderCredentials {
    /// Loads every credential from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut credentials = Self::default();
        credentials.fill_from_env();
        credentials
    }

    /// Fills any unset credential from its environment variable.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn fill_from_env(&mut self) {
        let fill = |slot: &mut Option<String>, var: &str| {
            if slot.as_deref().is_none_or(str::is_empty) {
                *slot = env::var(var).ok().filter(|v| !v.trim().is_empty());
            }
        };
        fill(&mut self.openai_api_key, "OPENAI_API_KEY");
        fill(&mut self.anthropic_api_key, "ANTHROPIC_API_KEY");
        fill(&mut self.mistral_api_key, "MISTRAL_API_KEY");
        fill(&mut self.groq_api_key, "GROQ_API_KEY");
        fill(&mut self.ollama_base_url, "OLLAMA_BASE_URL");
    }

    /// Returns the configured secret (or base URL for the local provider).
    #[must_use]
    pub fn get(&self, provider: ProviderId) -> Option<&str> {
        let value = match provider {
            ProviderId::OpenAI => &self.openai_api_key,
            ProviderId::Anthropic => &self.anthropic_api_key,
            ProviderId::Mistral => &self.mistral_api_key,
            ProviderId::Groq => &self.groq_api_key,
            ProviderId::Ollama => &self.ollama_base_url,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// Whether the provider has a usable credential.
    #[must_use]
    pub fn has_credentials(&self, provider: ProviderId) -> bool {
        self.get(provider).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_not_credentials() {
        let credentials = ProviderCredentials {
            openai_api_key: Some("sk-live".to_string()),
            anthropic_api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(credentials.has_credentials(ProviderId::OpenAI));
        assert!(!credentials.has_credentials(ProviderId::Anthropic));
        assert!(!credentials.has_credentials(ProviderId::Ollama));
    }

    #[test]
    fn test_get_trims_whitespace() {
        let credentials = ProviderCredentials {
            ollama_base_url: Some(" http://localhost:11434 ".to_string()),
            ..Default::default()
        };
        assert_eq!(credentials.get(ProviderId::Ollama), Some("http://localhost:11434"));
    }
}
