//! Policy engine selecting a (provider, model) pair for one execution.

use crate::types::OptimizationGoal;
use agora_abstraction::ProviderId;
use agora_models::ollama::DEFAULT_LOCAL_MODEL;
use std::collections::BTreeSet;
use tracing::debug;

/// Candidates tried in order when optimizing for latency.
const SPEED_RANKED: &[(ProviderId, &str)] = &[
    (ProviderId::Groq, "llama-3.1-8b-instant"),
    (ProviderId::Anthropic, "claude-3-haiku-20240307"),
    (ProviderId::OpenAI, "gpt-4o-mini"),
    (ProviderId::Mistral, "mistral-small-latest"),
];

/// Candidates tried in order when optimizing for price.
const COST_RANKED: &[(ProviderId, &str)] = &[
    (ProviderId::Groq, "llama-3.1-8b-instant"),
    (ProviderId::OpenAI, "gpt-4o-mini"),
    (ProviderId::Anthropic, "claude-3-haiku-20240307"),
    (ProviderId::Mistral, "mistral-small-latest"),
];

/// Preferred pair per task type.
const TASK_ROUTES: &[(&str, ProviderId, &str)] = &[
    ("coding", ProviderId::Anthropic, "claude-3-5-sonnet-20241022"),
    ("research", ProviderId::OpenAI, "gpt-4o"),
    ("analysis", ProviderId::OpenAI, "gpt-4o"),
    ("writing", ProviderId::Anthropic, "claude-3-5-sonnet-20241022"),
    ("summarization", ProviderId::Mistral, "mistral-small-latest"),
];

/// Models each provider supports, best first.
#[must_use]
pub fn supported_models(provider: ProviderId) -> &'static [&'static str] {
    match provider {
        ProviderId::OpenAI => &["gpt-4o", "gpt-4o-mini", "gpt-4", "gpt-3.5-turbo"],
        ProviderId::Anthropic => &[
            "claude-3-5-sonnet-20241022",
            "claude-3-opus-20240229",
            "claude-3-sonnet-20240229",
            "claude-3-haiku-20240307",
        ],
        ProviderId::Mistral => &["mistral-large-latest", "mistral-small-latest"],
        ProviderId::Groq => &["llama-3.1-70b-versatile", "llama-3.1-8b-instant"],
        ProviderId::Ollama => &[DEFAULT_LOCAL_MODEL],
    }
}

/// Deterministic router constrained to credentialed providers.
#[derive(Debug, Clone, Default)]
pub struct ModelRouter {
    available: BTreeSet<ProviderId>,
}

impl ModelRouter {
    /// Creates a router over the given credentialed providers.
    #[must_use]
    pub fn new(available: BTreeSet<ProviderId>) -> Self {
        Self { available }
    }

    /// Whether a provider has valid credentials.
    #[must_use]
    pub fn is_available(&self, provider: ProviderId) -> bool {
        self.available.contains(&provider)
    }

    /// Selects a provider and model; first matching rule wins.
    ///
    /// # Arguments
    /// * `task_type` - Optional category hint
    /// * `provider` - Caller's preferred provider
    /// * `model` - Caller's preferred model
    /// * `goal` - Optimization goal
    ///
    /// # Returns
    /// `None` when nothing is credentialed; the caller falls back to simulation.
    #[must_use]
    pub fn select(
        &self,
        task_type: Option<&str>,
        provider: Option<ProviderId>,
        model: Option<&str>,
        goal: OptimizationGoal,
    ) -> Option<(ProviderId, String)> {
        if let (Some(provider), Some(model)) = (provider, model) {
            if self.is_available(provider) {
                debug!(provider = %provider, model = model, "Routing to caller preference");
                return Some((provider, model.to_string()));
            }
        }

        let ranked = match goal {
            OptimizationGoal::Speed => Some(SPEED_RANKED),
            OptimizationGoal::Cost => Some(COST_RANKED),
            OptimizationGoal::Quality => None,
        };
        if let Some(candidates) = ranked {
            if let Some((provider, model)) = self.first_available(candidates) {
                debug!(provider = %provider, model = %model, goal = %goal, "Routing by goal ranking");
                return Some((provider, model));
            }
        }

        if let Some(task) = task_type {
            let task = task.to_lowercase();
            let route = TASK_ROUTES.iter().find(|(name, provider, _)| *name == task && self.is_available(*provider));
            if let Some((_, provider, model)) = route {
                debug!(provider = %provider, model = model, task_type = %task, "Routing by task type");
                return Some((*provider, (*model).to_string()));
            }
        }

        let remote = ProviderId::ALL.into_iter().filter(|p| !p.is_local());
        for provider in remote {
            if self.is_available(provider) {
                if let Some(model) = supported_models(provider).first() {
                    debug!(provider = %provider, model = model, "Routing by provider priority");
                    return Some((provider, (*model).to_string()));
                }
            }
        }

        if self.is_available(ProviderId::Ollama) {
            debug!(model = DEFAULT_LOCAL_MODEL, "Routing to local provider");
            return Some((ProviderId::Ollama, DEFAULT_LOCAL_MODEL.to_string()));
        }

        debug!("No credentialed provider available");
        None
    }

    fn first_available(&self, candidates: &[(ProviderId, &str)]) -> Option<(ProviderId, String)> {
        candidates
            .iter()
            .find(|(provider, _)| self.is_available(*provider))
            .map(|(provider, model)| (*provider, (*model).to_string()))
    }
}
