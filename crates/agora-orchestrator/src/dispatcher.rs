//! Single-execution pipeline.
//!
//! `execute` runs rate-limit admission, model selection, the provider call,
//! cost accounting and usage recording, and always returns an
//! [`ExecutionResult`]. Every failure mode is encoded in the result.

use crate::config::CoreConfig;
use crate::error::ExecutionError;
use crate::rate_limiter::RateLimiter;
use crate::routing::{CostTable, ModelRouter};
use crate::types::{AgentConfig, ExecutionResult, ExecutionStatus};
use crate::usage::{TracingUsageSink, UsageRecord, UsageSink};
use agora_abstraction::{ChatMessage, ProviderId};
use agora_models::{AdapterRegistry, simulated_reply};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Default hard ceiling on output tokens per request.
pub const DEFAULT_MAX_TOKENS_PER_REQUEST: u32 = 4096;

/// Turns an execution input into the user message text.
///
/// A string input is used verbatim; an object's `query` string is preferred;
/// anything else is sent as JSON text.
#[must_use]
pub fn user_message_text(input: &Value) -> String {
    match input {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("query") {
            Some(Value::String(query)) => query.clone(),
            _ => input.to_string(),
        },
        other => other.to_string(),
    }
}

/// Dispatches one execution to a provider.
pub struct ExecutionDispatcher {
    rate_limiter: Arc<RateLimiter>,
    router: ModelRouter,
    adapters: AdapterRegistry,
    costs: CostTable,
    usage_sink: Arc<dyn UsageSink>,
    max_tokens_per_request: u32,
}

impl ExecutionDispatcher {
    /// Creates a dispatcher over the given adapters with default limits.
    ///
    /// Routing is restricted to providers present in `adapters`.
    #[must_use]
    pub fn new(adapters: AdapterRegistry) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::default()),
            router: ModelRouter::new(adapters.available()),
            adapters,
            costs: CostTable::new(),
            usage_sink: Arc::new(TracingUsageSink),
            max_tokens_per_request: DEFAULT_MAX_TOKENS_PER_REQUEST,
        }
    }

    /// Wires a dispatcher from configuration.
    ///
    /// Provider adapters are built for every credential present in
    /// `config.providers`; usage goes to the tracing sink.
    #[must_use]
    pub fn from_config(config: &CoreConfig) -> Self {
        let adapters = AdapterRegistry::from_credentials(&config.providers, config.http_timeout());
        Self::new(adapters)
            .with_rate_limiter(Arc::new(RateLimiter::new(
                config.rate_limit.max_requests,
                config.rate_window(),
            )))
            .with_max_tokens_per_request(config.dispatch.max_tokens_per_request)
    }

    /// Replaces the rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Replaces the cost table.
    #[must_use]
    pub fn with_cost_table(mut self, costs: CostTable) -> Self {
        self.costs = costs;
        self
    }

    /// Replaces the usage sink.
    #[must_use]
    pub fn with_usage_sink(mut self, usage_sink: Arc<dyn UsageSink>) -> Self {
        self.usage_sink = usage_sink;
        self
    }

    /// Sets the hard per-request output token ceiling.
    #[must_use]
    pub fn with_max_tokens_per_request(mut self, max_tokens: u32) -> Self {
        self.max_tokens_per_request = max_tokens;
        self
    }

    /// The router used for selection.
    #[must_use]
    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Output token ceiling for a config: the lesser of requested and hard ceiling.
    #[must_use]
    pub fn token_ceiling(&self, config: &AgentConfig) -> u32 {
        config
            .max_tokens
            .map_or(self.max_tokens_per_request, |requested| requested.min(self.max_tokens_per_request))
    }

    /// Runs one execution. Never fails; errors are carried in the result.
    ///
    /// # Arguments
    /// * `config` - Agent configuration
    /// * `input` - Execution input (string or object with a `query` field)
    /// * `caller_id` - Identity used for rate limiting and usage attribution
    pub async fn execute(&self, config: &AgentConfig, input: &Value, caller_id: &str) -> ExecutionResult {
        let execution_id = uuid::Uuid::new_v4().to_string();

        if !self.rate_limiter.allow(caller_id) {
            warn!(caller_id = caller_id, execution_id = %execution_id, "Execution rejected by rate limiter");
            return ExecutionResult::failed_with_id(execution_id, &ExecutionError::RateLimitExceeded);
        }

        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(config.system_prompt.clone()),
            ChatMessage::user(user_message_text(input)),
        ];

        let selection = self.router.select(
            Some(config.category.as_str()),
            config.provider,
            config.model.as_deref(),
            config.optimize_for,
        );
        let Some((provider, model)) = selection else {
            debug!(execution_id = %execution_id, reason = %ExecutionError::NoProviderAvailable, "Simulating execution");
            return Self::simulated(execution_id, &messages, start);
        };
        let Some(adapter) = self.adapters.get(provider) else {
            debug!(execution_id = %execution_id, provider = %provider, "Selected provider has no adapter; simulating");
            return Self::simulated(execution_id, &messages, start);
        };

        let max_tokens = self.token_ceiling(config);
        debug!(
            execution_id = %execution_id,
            provider = %provider,
            model = %model,
            max_tokens = max_tokens,
            "Dispatching execution"
        );

        match adapter.call(&model, &messages, max_tokens).await {
            Ok(response) => {
                let tokens_input = u64::from(response.tokens_input());
                let tokens_output = u64::from(response.tokens_output());
                let cost = self.costs.cost(&model, tokens_input, tokens_output);
                let duration_ms = elapsed_ms(start);

                self.record_usage(UsageRecord {
                    execution_id: execution_id.clone(),
                    agent_id: config.agent_id.clone(),
                    caller_id: caller_id.to_string(),
                    provider,
                    model: model.clone(),
                    tokens_input,
                    tokens_output,
                    cost,
                    latency_ms: duration_ms,
                    status: ExecutionStatus::Completed,
                    recorded_at: Utc::now(),
                })
                .await;

                ExecutionResult {
                    execution_id,
                    status: ExecutionStatus::Completed,
                    output: Some(json!({
                        "result": response.content,
                        "provider": provider.as_str(),
                        "model": model,
                    })),
                    tokens_used: tokens_input + tokens_output,
                    cost,
                    duration_ms,
                    error: None,
                }
            }
            Err(err) => {
                let err = ExecutionError::from(err);
                let duration_ms = elapsed_ms(start);
                error!(
                    execution_id = %execution_id,
                    provider = %provider,
                    model = %model,
                    error = %err,
                    "Provider call failed"
                );

                self.record_usage(UsageRecord {
                    execution_id: execution_id.clone(),
                    agent_id: config.agent_id.clone(),
                    caller_id: caller_id.to_string(),
                    provider,
                    model,
                    tokens_input: 0,
                    tokens_output: 0,
                    cost: 0.0,
                    latency_ms: duration_ms,
                    status: ExecutionStatus::Error,
                    recorded_at: Utc::now(),
                })
                .await;

                ExecutionResult { duration_ms, ..ExecutionResult::failed_with_id(execution_id, &err) }
            }
        }
    }

    fn simulated(execution_id: String, messages: &[ChatMessage], start: Instant) -> ExecutionResult {
        ExecutionResult {
            execution_id,
            status: ExecutionStatus::Completed,
            output: Some(json!({
                "result": simulated_reply(messages),
                "provider": "simulated",
                "model": "simulated",
            })),
            tokens_used: 0,
            cost: 0.0,
            duration_ms: elapsed_ms(start),
            error: None,
        }
    }

    async fn record_usage(&self, record: UsageRecord) {
        let execution_id = record.execution_id.clone();
        if let Err(reason) = self.usage_sink.record(record).await {
            let err = ExecutionError::UsageRecordingFailed(reason);
            warn!(execution_id = %execution_id, error = %err, "Usage recording failed; continuing");
        }
    }
}

impl std::fmt::Debug for ExecutionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionDispatcher")
            .field("adapters", &self.adapters)
            .field("max_tokens_per_request", &self.max_tokens_per_request)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Provider named in a result payload; `None` for simulated or failed results.
#[must_use]
pub fn result_provider(result: &ExecutionResult) -> Option<ProviderId> {
    result.output.as_ref()?.get("provider")?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::InMemoryUsageSink;
    use agora_abstraction::{ModelError, ModelResponse, ModelUsage, ProviderAdapter};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies with a fixed text and usage, capturing the token ceiling it saw.
    struct FixedAdapter {
        provider: ProviderId,
        reply: Result<(String, ModelUsage), ModelError>,
        seen_max_tokens: Mutex<Vec<u32>>,
    }

    impl FixedAdapter {
        fn ok(provider: ProviderId, text: &str, usage: ModelUsage) -> Self {
            Self { provider, reply: Ok((text.to_string(), usage)), seen_max_tokens: Mutex::new(Vec::new()) }
        }

        fn failing(provider: ProviderId, err: ModelError) -> Self {
            Self { provider, reply: Err(err), seen_max_tokens: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ProviderAdapter for FixedAdapter {
        async fn call(&self, model: &str, _messages: &[ChatMessage], max_tokens: u32) -> Result<ModelResponse, ModelError> {
            self.seen_max_tokens.lock().unwrap().push(max_tokens);
            self.reply.clone().map(|(content, usage)| ModelResponse {
                content,
                model_id: Some(model.to_string()),
                usage: Some(usage),
            })
        }

        fn provider(&self) -> ProviderId {
            self.provider
        }
    }

    struct FailingSink;

    #[async_trait]
    impl UsageSink for FailingSink {
        async fn record(&self, _record: UsageRecord) -> Result<(), String> {
            Err("database unavailable".to_string())
        }
    }

    #[test]
    fn test_user_message_text() {
        assert_eq!(user_message_text(&json!("plain")), "plain");
        assert_eq!(user_message_text(&json!({"query": "q", "extra": 1})), "q");
        assert_eq!(user_message_text(&json!({"topic": "x"})), r#"{"topic":"x"}"#);
    }

    #[tokio::test]
    async fn test_successful_execution_costs_and_records() {
        let adapter = Arc::new(FixedAdapter::ok(ProviderId::OpenAI, "answer", ModelUsage::new(1000, 500)));
        let sink = Arc::new(InMemoryUsageSink::new());
        let dispatcher = ExecutionDispatcher::new(AdapterRegistry::new().with_adapter(ProviderId::OpenAI, adapter))
            .with_usage_sink(sink.clone());

        let config = AgentConfig::new("sys").with_agent_id("agent-1").with_model(ProviderId::OpenAI, "gpt-4");
        let result = dispatcher.execute(&config, &json!({"query": "hi"}), "u1").await;

        assert!(result.is_completed());
        assert_eq!(result.output_text(), Some("answer"));
        assert_eq!(result.tokens_used, 1500);
        assert!((result.cost - 0.06).abs() < 1e-12);
        assert_eq!(result_provider(&result), Some(ProviderId::OpenAI));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agent_id.as_deref(), Some("agent-1"));
        assert_eq!(records[0].execution_id, result.execution_id);
    }

    #[tokio::test]
    async fn test_token_ceiling_is_capped() {
        let adapter = Arc::new(FixedAdapter::ok(ProviderId::Groq, "ok", ModelUsage::default()));
        let dispatcher =
            ExecutionDispatcher::new(AdapterRegistry::new().with_adapter(ProviderId::Groq, adapter.clone()));

        dispatcher.execute(&AgentConfig::default().with_max_tokens(10_000), &json!("a"), "u1").await;
        dispatcher.execute(&AgentConfig::default().with_max_tokens(100), &json!("b"), "u1").await;
        dispatcher.execute(&AgentConfig::default(), &json!("c"), "u1").await;

        assert_eq!(*adapter.seen_max_tokens.lock().unwrap(), vec![4096, 100, 4096]);
    }

    #[tokio::test]
    async fn test_no_provider_simulates() {
        let sink = Arc::new(InMemoryUsageSink::new());
        let dispatcher = ExecutionDispatcher::new(AdapterRegistry::new()).with_usage_sink(sink.clone());

        let result = dispatcher.execute(&AgentConfig::default(), &json!({"query": "ping"}), "u1").await;

        assert!(result.is_completed());
        assert_eq!(result.output_text(), Some("Agent execution simulated for input: ping"));
        assert_eq!(result.tokens_used, 0);
        assert_eq!(result.cost, 0.0);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_adapter_failure_becomes_error_result() {
        let adapter = Arc::new(FixedAdapter::failing(
            ProviderId::Anthropic,
            ModelError::RequestError("Network error: refused".to_string()),
        ));
        let sink = Arc::new(InMemoryUsageSink::new());
        let dispatcher = ExecutionDispatcher::new(AdapterRegistry::new().with_adapter(ProviderId::Anthropic, adapter))
            .with_usage_sink(sink.clone());

        let result = dispatcher.execute(&AgentConfig::default(), &json!("x"), "u1").await;

        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error.as_deref(), Some("Request Error: Network error: refused"));
        assert_eq!(result.cost, 0.0);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ExecutionStatus::Error);
        assert_eq!(records[0].tokens_input + records[0].tokens_output, 0);
    }

    #[tokio::test]
    async fn test_usage_failure_is_swallowed() {
        let adapter = Arc::new(FixedAdapter::ok(ProviderId::OpenAI, "fine", ModelUsage::new(1, 1)));
        let dispatcher = ExecutionDispatcher::new(AdapterRegistry::new().with_adapter(ProviderId::OpenAI, adapter))
            .with_usage_sink(Arc::new(FailingSink));

        let result = dispatcher.execute(&AgentConfig::default(), &json!("x"), "u1").await;
        assert!(result.is_completed());
        assert_eq!(result.output_text(), Some("fine"));
    }

    #[tokio::test]
    async fn test_rate_limited_caller_gets_error() {
        let dispatcher = ExecutionDispatcher::new(AdapterRegistry::new())
            .with_rate_limiter(Arc::new(RateLimiter::new(1, Duration::from_secs(60))));

        assert!(dispatcher.execute(&AgentConfig::default(), &json!("x"), "u1").await.is_completed());
        let rejected = dispatcher.execute(&AgentConfig::default(), &json!("x"), "u1").await;

        assert_eq!(rejected.status, ExecutionStatus::Error);
        assert_eq!(rejected.error.as_deref(), Some("Rate limit exceeded. Please try again later."));
        assert_eq!(rejected.tokens_used, 0);
        assert!(dispatcher.execute(&AgentConfig::default(), &json!("x"), "u2").await.is_completed());
    }

    #[test]
    fn test_from_config_applies_limits() {
        let mut config = CoreConfig::default();
        config.dispatch.max_tokens_per_request = 512;
        config.providers.ollama_base_url = Some("http://localhost:11434".to_string());

        let dispatcher = ExecutionDispatcher::from_config(&config);
        assert_eq!(dispatcher.token_ceiling(&AgentConfig::default()), 512);
        assert!(dispatcher.router().is_available(ProviderId::Ollama));
        assert!(!dispatcher.router().is_available(ProviderId::OpenAI));
    }
}
