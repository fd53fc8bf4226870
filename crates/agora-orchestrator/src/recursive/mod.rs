//! Bounded, breaker-protected self-reference: sub-agent trees, feedback
//! iterations and self-modifying workflows.

pub mod circuit_breaker;
pub mod orchestrator;
pub mod tree;
pub mod workflow;

pub use circuit_breaker::{BreakerPermit, BreakerRegistry, CircuitBreaker, CircuitState};
pub use orchestrator::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_FEEDBACK_ITERATIONS, RecursiveOrchestrator, feedback_query};
pub use tree::{ExecutionTree, ExecutionTreeNode, ResultSnapshot, Subtask, TreeView};
pub use workflow::WorkflowStep;
