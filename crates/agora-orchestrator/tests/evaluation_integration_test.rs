//! Evaluation scoring and improved-config synthesis.

use agora_abstraction::{ChatMessage, ModelError, ModelResponse, ModelUsage, ProviderAdapter, ProviderId};
use agora_models::AdapterRegistry;
use agora_orchestrator::evaluation::evaluator::PRECISION_INSTRUCTIONS;
use agora_orchestrator::{
    AgentConfig, EvaluationError, EvaluationResult, EvaluationStore, EvaluationTarget, Evaluator, ExecutionDispatcher,
    ImprovementChange, InMemoryEvaluationStore, ScoreSummary, TestCase,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};

/// Always replies with the same text; records which models were requested.
struct EchoAdapter {
    provider: ProviderId,
    reply: String,
    usage: ModelUsage,
    models: Mutex<Vec<String>>,
}

impl EchoAdapter {
    fn new(provider: ProviderId, reply: &str, usage: ModelUsage) -> Arc<Self> {
        Arc::new(Self { provider, reply: reply.to_string(), usage, models: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl ProviderAdapter for EchoAdapter {
    async fn call(&self, model: &str, _messages: &[ChatMessage], _max_tokens: u32) -> Result<ModelResponse, ModelError> {
        self.models.lock().unwrap().push(model.to_string());
        Ok(ModelResponse { content: self.reply.clone(), model_id: Some(model.to_string()), usage: Some(self.usage) })
    }

    fn provider(&self) -> ProviderId {
        self.provider
    }
}

/// Delegates to an in-memory store but refuses writes for one agent.
struct RejectingStore {
    inner: InMemoryEvaluationStore,
    reject: &'static str,
}

#[async_trait]
impl EvaluationStore for RejectingStore {
    async fn save(&self, result: EvaluationResult) -> Result<(), EvaluationError> {
        if result.agent_id == self.reject {
            return Err(EvaluationError::Store("disk full".to_string()));
        }
        self.inner.save(result).await
    }

    async fn latest(&self, agent_id: &str) -> Result<Option<EvaluationResult>, EvaluationError> {
        self.inner.latest(agent_id).await
    }
}

fn evaluator_with(adapter: Arc<EchoAdapter>, store: Arc<InMemoryEvaluationStore>) -> Evaluator {
    let provider = adapter.provider;
    let dispatcher = ExecutionDispatcher::new(AdapterRegistry::new().with_adapter(provider, adapter));
    Evaluator::new(Arc::new(dispatcher), store)
}

fn stored(agent_id: &str, accuracy: f64, speed: f64, cost: f64) -> EvaluationResult {
    EvaluationResult {
        agent_id: agent_id.to_string(),
        scores: ScoreSummary { accuracy, speed, cost, overall: 0.5 * accuracy + 0.3 * speed + 0.2 * cost },
        category: "default".to_string(),
        cases: Vec::new(),
        evaluated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_no_keyword_matches_scores_zero_accuracy() {
    let adapter = EchoAdapter::new(ProviderId::OpenAI, "I cannot say anything useful.", ModelUsage::new(10, 10));
    let store = Arc::new(InMemoryEvaluationStore::new());
    let evaluator = evaluator_with(adapter, Arc::clone(&store));

    let config = AgentConfig::new("sys").with_category("coding");
    let result = evaluator.evaluate("agent-1", &config, None).await.unwrap();

    assert_eq!(result.cases.len(), 2);
    assert_eq!(result.scores.accuracy, 0.0);
    assert!(result.scores.overall <= 0.5);
    assert_eq!(result.category, "coding");
    assert!(store.latest("agent-1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_supplied_cases_override_category_suite() {
    let adapter = EchoAdapter::new(ProviderId::OpenAI, "The Attention mechanism", ModelUsage::default());
    let evaluator = evaluator_with(adapter, Arc::new(InMemoryEvaluationStore::new()));

    let cases = vec![TestCase::query("anything", &["attention", "missing"])];
    let result = evaluator.evaluate("agent-2", &AgentConfig::default(), Some(&cases)).await.unwrap();

    assert_eq!(result.cases.len(), 1);
    assert_eq!(result.scores.accuracy, 0.5);
    assert_eq!(result.scores.cost, 1.0);
}

#[tokio::test]
async fn test_slow_model_is_substituted() {
    let adapter = EchoAdapter::new(ProviderId::OpenAI, "help", ModelUsage::default());
    let store = Arc::new(InMemoryEvaluationStore::new());
    store.save(stored("agent-3", 0.9, 0.3, 0.9)).await.unwrap();
    let evaluator = evaluator_with(adapter.clone(), Arc::clone(&store));

    let config = AgentConfig::new("sys").with_model(ProviderId::OpenAI, "gpt-4");
    let improved = evaluator.generate_improved_config("agent-3", &config).await.unwrap();

    assert_eq!(improved.model.as_deref(), Some("gpt-3.5-turbo"));
    assert_ne!(improved.model, config.model);
    assert!(improved.is_improved_version);
    assert_eq!(improved.parent_agent_id.as_deref(), Some("agent-3"));

    let reason = improved.improvement_reason.unwrap();
    assert_eq!(reason.changes_applied, vec![ImprovementChange::ModelChange]);
    assert!((reason.parent_scores.speed - 0.3).abs() < f64::EPSILON);

    // The cached result was used, so nothing was dispatched.
    assert!(adapter.models.lock().unwrap().is_empty());
    assert_eq!(config.model.as_deref(), Some("gpt-4"));
}

#[tokio::test]
async fn test_poor_accuracy_and_cost_apply_prompt_and_token_cap() {
    let adapter = EchoAdapter::new(ProviderId::OpenAI, "x", ModelUsage::default());
    let store = Arc::new(InMemoryEvaluationStore::new());
    store.save(stored("agent-4", 0.2, 0.9, 0.1)).await.unwrap();
    let evaluator = evaluator_with(adapter, Arc::clone(&store));

    let config = AgentConfig::new("Base prompt.");
    let improved = evaluator.generate_improved_config("agent-4", &config).await.unwrap();

    assert_eq!(improved.system_prompt, format!("Base prompt.\n\n{PRECISION_INSTRUCTIONS}"));
    assert_eq!(improved.max_tokens, Some(2048));
    assert_eq!(
        improved.improvement_reason.unwrap().changes_applied,
        vec![ImprovementChange::PromptEnhancement, ImprovementChange::TokenLimitReduction]
    );
}

#[tokio::test]
async fn test_missing_result_triggers_evaluation() {
    let adapter = EchoAdapter::new(ProviderId::OpenAI, "happy to help", ModelUsage::default());
    let store = Arc::new(InMemoryEvaluationStore::new());
    let evaluator = evaluator_with(adapter.clone(), Arc::clone(&store));

    let config = AgentConfig::new("sys").with_model(ProviderId::OpenAI, "gpt-4o");
    let improved = evaluator.generate_improved_config("agent-5", &config).await.unwrap();

    assert_eq!(adapter.models.lock().unwrap().len(), 1);
    assert!(store.latest("agent-5").await.unwrap().is_some());
    assert!(improved.improvement_reason.unwrap().changes_applied.is_empty());
    assert_eq!(improved.system_prompt, config.system_prompt);
}

#[tokio::test]
async fn test_cycle_evaluates_every_target() {
    let adapter = EchoAdapter::new(ProviderId::OpenAI, "help", ModelUsage::default());
    let store = Arc::new(InMemoryEvaluationStore::new());
    let evaluator = evaluator_with(adapter, Arc::clone(&store));

    let targets = vec![
        EvaluationTarget::new("a", AgentConfig::default()),
        EvaluationTarget::new("b", AgentConfig::default().with_category("writing")),
    ];
    let results = evaluator.run_evaluation_cycle(&targets).await;

    assert_eq!(results.len(), 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_cycle_skips_agent_whose_evaluation_fails() {
    let adapter = EchoAdapter::new(ProviderId::OpenAI, "help", ModelUsage::default());
    let store = Arc::new(RejectingStore { inner: InMemoryEvaluationStore::new(), reject: "b" });
    let dispatcher = ExecutionDispatcher::new(AdapterRegistry::new().with_adapter(ProviderId::OpenAI, adapter));
    let evaluator = Evaluator::new(Arc::new(dispatcher), Arc::clone(&store) as Arc<dyn EvaluationStore>);

    let targets = vec![
        EvaluationTarget::new("a", AgentConfig::default()),
        EvaluationTarget::new("b", AgentConfig::default()),
        EvaluationTarget::new("c", AgentConfig::default()),
    ];
    let results = evaluator.run_evaluation_cycle(&targets).await;

    let evaluated: Vec<&str> = results.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(evaluated, vec!["a", "c"]);
    assert_eq!(store.inner.len(), 2);
    assert!(store.latest("b").await.unwrap().is_none());
}
