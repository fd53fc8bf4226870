//! Scores agents against test suites and derives improved configs.

use super::store::EvaluationStore;
use super::test_cases::{TestCase, default_test_cases};
use crate::config::CoreConfig;
use crate::dispatcher::ExecutionDispatcher;
use crate::error::EvaluationError;
use crate::types::{AgentConfig, ExecutionStatus, ImprovementChange, ImprovementReason, ScoreSummary};
use agora_abstraction::ProviderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Caller ID used for evaluation dispatches unless overridden.
pub const DEFAULT_EVALUATOR_CALLER_ID: &str = "meta-agent-evaluator";

/// Token cap applied when the cost score is poor.
pub const IMPROVED_MAX_TOKENS: u32 = 2048;

/// Instruction block appended when the accuracy score is poor.
pub const PRECISION_INSTRUCTIONS: &str = "IMPORTANT: Be thorough and precise in your responses. \
     Include specific details, examples, and relevant technical terms. \
     Structure your response clearly with key points highlighted.";

/// Scores below this trigger an improvement.
const IMPROVEMENT_THRESHOLD: f64 = 0.5;

/// Faster replacement per (provider, model).
const FASTER_MODELS: &[((ProviderId, &str), (ProviderId, &str))] = &[
    ((ProviderId::OpenAI, "gpt-4"), (ProviderId::OpenAI, "gpt-3.5-turbo")),
    (
        (ProviderId::Anthropic, "claude-3-opus-20240229"),
        (ProviderId::Anthropic, "claude-3-sonnet-20240229"),
    ),
    (
        (ProviderId::Anthropic, "claude-3-sonnet-20240229"),
        (ProviderId::Anthropic, "claude-3-haiku-20240307"),
    ),
    ((ProviderId::Mistral, "mistral-large-latest"), (ProviderId::Mistral, "mistral-small-latest")),
];

/// Faster substitute for a model, if one is documented.
#[must_use]
pub fn faster_model(provider: ProviderId, model: &str) -> Option<(ProviderId, &'static str)> {
    FASTER_MODELS
        .iter()
        .find(|((p, m), _)| *p == provider && *m == model)
        .map(|(_, replacement)| *replacement)
}

/// Fraction of keywords present in the output, case-insensitively.
///
/// With no keywords, any non-empty output scores 1.0.
#[must_use]
pub fn score_accuracy(output: &str, expected_keywords: &[String]) -> f64 {
    if expected_keywords.is_empty() {
        return if output.is_empty() { 0.0 } else { 1.0 };
    }
    let output = output.to_lowercase();
    let matches = expected_keywords.iter().filter(|kw| output.contains(&kw.to_lowercase())).count();
    matches as f64 / expected_keywords.len() as f64
}

/// 1.0 at or below 500ms, falling linearly to 0.0 at 10s.
#[must_use]
pub fn score_speed(latency_ms: u64) -> f64 {
    match latency_ms {
        0..=500 => 1.0,
        10_000.. => 0.0,
        ms => (1.0 - (ms - 500) as f64 / 9500.0).max(0.0),
    }
}

/// 1.0 at $0, falling linearly to 0.0 at $0.10.
#[must_use]
pub fn score_cost(cost: f64) -> f64 {
    if cost <= 0.0 {
        1.0
    } else if cost >= 0.10 {
        0.0
    } else {
        (1.0 - cost / 0.10).max(0.0)
    }
}

/// Weighted overall score.
#[must_use]
pub fn score_overall(accuracy: f64, speed: f64, cost: f64) -> f64 {
    accuracy * 0.5 + speed * 0.3 + cost * 0.2
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }
}

/// Scores for one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDetail {
    /// Input that was dispatched.
    pub input: Value,
    /// Execution status.
    pub status: ExecutionStatus,
    /// Keyword accuracy.
    pub accuracy: f64,
    /// Latency score.
    pub speed: f64,
    /// Cost score.
    pub cost: f64,
    /// Measured latency.
    pub latency_ms: u64,
    /// Measured cost.
    pub cost_usd: f64,
}

/// Aggregate evaluation of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Evaluated agent.
    pub agent_id: String,
    /// Mean scores, rounded to 4 places.
    pub scores: ScoreSummary,
    /// Category the suite was chosen for.
    pub category: String,
    /// Per-case detail.
    pub cases: Vec<CaseDetail>,
    /// When the evaluation finished.
    pub evaluated_at: DateTime<Utc>,
}

/// An agent in an evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTarget {
    /// Catalog ID.
    pub agent_id: String,
    /// Config to evaluate.
    pub config: AgentConfig,
}

impl EvaluationTarget {
    /// Creates a target.
    pub fn new(agent_id: impl Into<String>, config: AgentConfig) -> Self {
        Self { agent_id: agent_id.into(), config }
    }
}

/// Runs test suites through the dispatcher and persists the scores.
pub struct Evaluator {
    dispatcher: Arc<ExecutionDispatcher>,
    store: Arc<dyn EvaluationStore>,
    caller_id: String,
}

impl Evaluator {
    /// Creates an evaluator dispatching under the default evaluator caller ID.
    #[must_use]
    pub fn new(dispatcher: Arc<ExecutionDispatcher>, store: Arc<dyn EvaluationStore>) -> Self {
        Self { dispatcher, store, caller_id: DEFAULT_EVALUATOR_CALLER_ID.to_string() }
    }

    /// Creates an evaluator dispatching under `[evaluation] caller_id`.
    #[must_use]
    pub fn from_config(
        dispatcher: Arc<ExecutionDispatcher>,
        store: Arc<dyn EvaluationStore>,
        config: &CoreConfig,
    ) -> Self {
        Self::new(dispatcher, store).with_caller_id(config.evaluation.caller_id.clone())
    }

    /// Caller ID used for evaluation dispatches.
    #[must_use]
    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    /// Overrides the caller ID used for evaluation dispatches.
    #[must_use]
    pub fn with_caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = caller_id.into();
        self
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EvaluationStore> {
        &self.store
    }

    /// Evaluates an agent and stores the result, replacing any earlier one.
    ///
    /// # Arguments
    /// * `agent_id` - Catalog ID the result is stored under
    /// * `config` - Config to evaluate
    /// * `test_cases` - Cases to run; `None` or empty uses the category suite
    ///
    /// # Errors
    /// Returns an error if the result cannot be stored.
    pub async fn evaluate(
        &self,
        agent_id: &str,
        config: &AgentConfig,
        test_cases: Option<&[TestCase]>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let cases = match test_cases {
            Some(cases) if !cases.is_empty() => cases.to_vec(),
            _ => default_test_cases(&config.category),
        };
        debug!(agent_id = agent_id, category = %config.category, cases = cases.len(), "Evaluating agent");

        let mut details = Vec::with_capacity(cases.len());
        for case in &cases {
            let result = self.dispatcher.execute(config, &case.input, &self.caller_id).await;
            let output = result.output_text().unwrap_or_default();

            details.push(CaseDetail {
                input: case.input.clone(),
                status: result.status,
                accuracy: score_accuracy(output, &case.expected_keywords),
                speed: score_speed(result.duration_ms),
                cost: score_cost(result.cost),
                latency_ms: result.duration_ms,
                cost_usd: result.cost,
            });
        }

        let accuracy = mean(&details.iter().map(|d| d.accuracy).collect::<Vec<_>>());
        let speed = mean(&details.iter().map(|d| d.speed).collect::<Vec<_>>());
        let cost = mean(&details.iter().map(|d| d.cost).collect::<Vec<_>>());

        let evaluation = EvaluationResult {
            agent_id: agent_id.to_string(),
            scores: ScoreSummary {
                accuracy: round4(accuracy),
                speed: round4(speed),
                cost: round4(cost),
                overall: round4(score_overall(accuracy, speed, cost)),
            },
            category: config.category.clone(),
            cases: details,
            evaluated_at: Utc::now(),
        };

        self.store.save(evaluation.clone()).await?;
        info!(
            agent_id = agent_id,
            accuracy = evaluation.scores.accuracy,
            speed = evaluation.scores.speed,
            cost = evaluation.scores.cost,
            overall = evaluation.scores.overall,
            "Agent evaluated"
        );
        Ok(evaluation)
    }

    /// Derives an improved config from the agent's latest scores.
    ///
    /// Evaluates first when no stored result exists. The input config is
    /// never modified.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    pub async fn generate_improved_config(
        &self,
        agent_id: &str,
        config: &AgentConfig,
    ) -> Result<AgentConfig, EvaluationError> {
        let evaluation = match self.store.latest(agent_id).await? {
            Some(evaluation) => evaluation,
            None => self.evaluate(agent_id, config, None).await?,
        };
        let scores = evaluation.scores;

        let mut improved = config.clone();
        improved.parent_agent_id = Some(agent_id.to_string());
        improved.is_improved_version = true;

        if scores.speed < IMPROVEMENT_THRESHOLD {
            if let (Some(provider), Some(model)) = (config.provider, config.model.as_deref()) {
                if let Some((faster_provider, faster)) = faster_model(provider, model) {
                    improved.provider = Some(faster_provider);
                    improved.model = Some(faster.to_string());
                }
            }
        }

        if scores.accuracy < IMPROVEMENT_THRESHOLD {
            improved.system_prompt = format!("{}\n\n{}", config.system_prompt, PRECISION_INSTRUCTIONS);
        }

        if scores.cost < IMPROVEMENT_THRESHOLD {
            let current = config.max_tokens.unwrap_or(crate::dispatcher::DEFAULT_MAX_TOKENS_PER_REQUEST);
            improved.max_tokens = Some(current.min(IMPROVED_MAX_TOKENS));
        }

        let mut changes = Vec::new();
        if improved.model != config.model {
            changes.push(ImprovementChange::ModelChange);
        }
        if improved.system_prompt != config.system_prompt {
            changes.push(ImprovementChange::PromptEnhancement);
        }
        if improved.max_tokens != config.max_tokens {
            changes.push(ImprovementChange::TokenLimitReduction);
        }

        info!(agent_id = agent_id, changes = ?changes, "Generated improved config");
        improved.improvement_reason = Some(ImprovementReason { parent_scores: scores, changes_applied: changes });
        Ok(improved)
    }

    /// Evaluates every target in order, skipping any that fail.
    pub async fn run_evaluation_cycle(&self, targets: &[EvaluationTarget]) -> Vec<EvaluationResult> {
        self.run_cycle(targets, None).await
    }

    /// Like [`Self::run_evaluation_cycle`], stopping between targets once
    /// `cancel` fires.
    pub(crate) async fn run_cycle(
        &self,
        targets: &[EvaluationTarget],
        cancel: Option<&CancellationToken>,
    ) -> Vec<EvaluationResult> {
        info!(agents = targets.len(), "Starting agent evaluation cycle");
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!(evaluated = results.len(), "Evaluation cycle cancelled");
                return results;
            }
            match self.evaluate(&target.agent_id, &target.config, None).await {
                Ok(result) => results.push(result),
                Err(err) => error!(agent_id = %target.agent_id, error = %err, "Failed to evaluate agent"),
            }
        }

        info!(evaluated = results.len(), "Completed agent evaluation cycle");
        results
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator").field("caller_id", &self.caller_id).finish_non_exhaustive()
    }
}
