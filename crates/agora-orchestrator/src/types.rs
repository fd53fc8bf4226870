//! Values passed into and returned from the execution core.

use crate::error::ExecutionError;
use agora_abstraction::ProviderId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Default system prompt for configs that do not supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Category used when an agent has none.
pub const DEFAULT_CATEGORY: &str = "default";

/// What routing should optimize for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationGoal {
    /// Best output quality (task-type routing, then priority order).
    #[default]
    Quality,
    /// Lowest latency.
    Speed,
    /// Lowest price.
    Cost,
}

impl fmt::Display for OptimizationGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationGoal::Quality => write!(f, "quality"),
            OptimizationGoal::Speed => write!(f, "speed"),
            OptimizationGoal::Cost => write!(f, "cost"),
        }
    }
}

/// Configuration of one agent, owned by the external catalog.
///
/// The core treats this as an immutable value: derived configs (sub-agents,
/// improved versions) are fresh copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Catalog ID of the agent, used to attribute usage.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Preferred provider.
    #[serde(default)]
    pub provider: Option<ProviderId>,
    /// Preferred model ID.
    #[serde(default)]
    pub model: Option<String>,
    /// System prompt sent with every execution.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Category / task-type tag (e.g. "coding", "research").
    #[serde(default = "default_category")]
    pub category: String,
    /// Routing optimization goal.
    #[serde(default)]
    pub optimize_for: OptimizationGoal,
    /// Requested ceiling on output tokens.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Agent this config was derived from.
    #[serde(default)]
    pub parent_agent_id: Option<String>,
    /// Set on configs produced by the evaluator.
    #[serde(default)]
    pub is_improved_version: bool,
    /// Why an improved config differs from its parent.
    #[serde(default)]
    pub improvement_reason: Option<ImprovementReason>,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            provider: None,
            model: None,
            system_prompt: default_system_prompt(),
            category: default_category(),
            optimize_for: OptimizationGoal::Quality,
            max_tokens: None,
            parent_agent_id: None,
            is_improved_version: false,
            improvement_reason: None,
        }
    }
}

impl AgentConfig {
    /// Creates a config with the given system prompt and defaults elsewhere.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { system_prompt: system_prompt.into(), ..Self::default() }
    }

    /// Sets the catalog agent ID.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Pins a provider and model.
    #[must_use]
    pub fn with_model(mut self, provider: ProviderId, model: impl Into<String>) -> Self {
        self.provider = Some(provider);
        self.model = Some(model.into());
        self
    }

    /// Sets the category tag.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Sets the routing optimization goal.
    #[must_use]
    pub fn optimize_for(mut self, goal: OptimizationGoal) -> Self {
        self.optimize_for = goal;
        self
    }

    /// Sets the requested output token ceiling.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A change the evaluator applied to produce an improved config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementChange {
    /// Switched to a faster model.
    ModelChange,
    /// Appended the precision instruction block to the system prompt.
    PromptEnhancement,
    /// Capped the output token ceiling.
    TokenLimitReduction,
}

/// Aggregate scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreSummary {
    /// Keyword accuracy.
    pub accuracy: f64,
    /// Latency score.
    pub speed: f64,
    /// Cost score.
    pub cost: f64,
    /// Weighted overall score.
    pub overall: f64,
}

/// Metadata attached to an improved config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementReason {
    /// Scores of the config this one was derived from.
    pub parent_scores: ScoreSummary,
    /// Changes applied, in application order.
    pub changes_applied: Vec<ImprovementChange>,
}

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The execution produced output.
    Completed,
    /// The execution failed; see the error message.
    Error,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Error => write!(f, "error"),
        }
    }
}

/// Outcome of one dispatch. Created once, never mutated by the core after return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Fresh per call.
    pub execution_id: String,
    /// Completed or error.
    pub status: ExecutionStatus,
    /// Output payload: `{"result": ..., "provider": ..., "model": ...}`.
    pub output: Option<Value>,
    /// Input plus output tokens.
    pub tokens_used: u64,
    /// Monetary cost in USD.
    pub cost: f64,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Error message when `status` is `Error`.
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Builds a zero-cost error result with a fresh execution ID.
    #[must_use]
    pub fn failed(error: &ExecutionError) -> Self {
        Self::failed_with_id(uuid::Uuid::new_v4().to_string(), error)
    }

    /// Builds a zero-cost error result under an existing execution ID.
    #[must_use]
    pub fn failed_with_id(execution_id: String, error: &ExecutionError) -> Self {
        Self {
            execution_id,
            status: ExecutionStatus::Error,
            output: None,
            tokens_used: 0,
            cost: 0.0,
            duration_ms: 0,
            error: Some(error.to_string()),
        }
    }

    /// Whether the execution completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// The generated text, if any.
    #[must_use]
    pub fn output_text(&self) -> Option<&str> {
        self.output.as_ref()?.get("result")?.as_str()
    }
}
