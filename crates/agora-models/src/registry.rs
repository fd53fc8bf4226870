//! Adapter lookup table.
//!
//! Dispatch by provider goes through this registry; only providers with a
//! usable credential get an adapter, so membership doubles as the
//! credential-presence check used by routing.

use crate::{AnthropicAdapter, OllamaAdapter, OpenAIAdapter, ProviderCredentials};
use agora_abstraction::{ProviderAdapter, ProviderId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Maps each configured provider to its adapter.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds adapters for every provider that has credentials.
    ///
    /// # Arguments
    /// * `credentials` - Credential presence per provider
    /// * `timeout` - HTTP timeout applied to every adapter
    #[must_use]
    pub fn from_credentials(credentials: &ProviderCredentials, timeout: Duration) -> Self {
        let mut registry = Self::new();
        for provider in ProviderId::ALL {
            let Some(secret) = credentials.get(provider) else {
                continue;
            };
            let secret = secret.to_string();
            let adapter: Arc<dyn ProviderAdapter> = match provider {
                ProviderId::OpenAI => Arc::new(OpenAIAdapter::new(secret).with_timeout(timeout)),
                ProviderId::Mistral => Arc::new(OpenAIAdapter::mistral(secret).with_timeout(timeout)),
                ProviderId::Groq => Arc::new(OpenAIAdapter::groq(secret).with_timeout(timeout)),
                ProviderId::Anthropic => Arc::new(AnthropicAdapter::new(secret).with_timeout(timeout)),
                ProviderId::Ollama => Arc::new(OllamaAdapter::new(secret).with_timeout(timeout)),
            };
            debug!(provider = %provider, "Registered provider adapter");
            registry.adapters.insert(provider, adapter);
        }
        registry
    }

    /// Registers (or replaces) the adapter for a provider.
    #[must_use]
    pub fn with_adapter(mut self, provider: ProviderId, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(provider, adapter);
        self
    }

    /// Looks up the adapter for a provider.
    #[must_use]
    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// Whether the provider has a registered adapter.
    #[must_use]
    pub fn is_available(&self, provider: ProviderId) -> bool {
        self.adapters.contains_key(&provider)
    }

    /// Every provider with a registered adapter.
    #[must_use]
    pub fn available(&self) -> BTreeSet<ProviderId> {
        self.adapters.keys().copied().collect()
    }
}
