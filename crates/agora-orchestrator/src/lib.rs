//! Agent execution and recursive orchestration core for Agora.
//!
//! - [`ExecutionDispatcher`] runs one execution: rate limiting, routing,
//!   the provider call, cost accounting and usage recording.
//! - [`RecursiveOrchestrator`] spawns depth-bounded sub-agents, runs
//!   feedback iterations and rewrites workflow steps, each behind a
//!   per-key [`CircuitBreaker`].
//! - [`Evaluator`] scores agents against test suites and synthesizes
//!   improved configs; [`EvaluationScheduler`] repeats that in the background.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora_orchestrator::{AgentConfig, CoreConfig, ExecutionDispatcher};
//! use serde_json::json;
//!
//! # async fn run() {
//! let config = CoreConfig::default().apply_env();
//! let dispatcher = ExecutionDispatcher::from_config(&config);
//! let result = dispatcher
//!     .execute(&AgentConfig::new("You are concise."), &json!({"query": "Hello"}), "user-1")
//!     .await;
//! println!("{:?}", result.output_text());
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod evaluation;
pub mod rate_limiter;
pub mod recursive;
pub mod routing;
pub mod telemetry;
pub mod types;
pub mod usage;

pub use config::{ConfigError, CoreConfig, CoreConfigLoader};
pub use dispatcher::{DEFAULT_MAX_TOKENS_PER_REQUEST, ExecutionDispatcher, user_message_text};
pub use error::{EvaluationError, ExecutionError, SchedulerError};
pub use evaluation::{
    CaseDetail, EvaluationResult, EvaluationScheduler, EvaluationStore, EvaluationTarget, Evaluator,
    InMemoryEvaluationStore, TestCase, default_test_cases,
};
pub use rate_limiter::RateLimiter;
pub use recursive::{
    BreakerPermit, BreakerRegistry, CircuitBreaker, CircuitState, ExecutionTree, ExecutionTreeNode, RecursiveOrchestrator,
    ResultSnapshot, Subtask, TreeView, WorkflowStep,
};
pub use routing::{CostTable, ModelRouter, TokenRates};
pub use types::{
    AgentConfig, ExecutionResult, ExecutionStatus, ImprovementChange, ImprovementReason, OptimizationGoal,
    ScoreSummary,
};
pub use usage::{InMemoryUsageSink, TracingUsageSink, UsageRecord, UsageSink};
