//! Sub-agent spawning, feedback iterations and workflow self-modification.
//!
//! All three operations are gated by a per-key circuit breaker and bounded
//! by the recursion ceiling. When an interlock trips the orchestrator hands
//! back the best prior value (previous result, original steps) or an
//! error-status result; it never returns `Err`.

use super::circuit_breaker::{BreakerRegistry, CircuitState};
use super::tree::{ExecutionTree, ExecutionTreeNode, ResultSnapshot, Subtask, TreeView};
use super::workflow::WorkflowStep;
use crate::config::CoreConfig;
use crate::dispatcher::ExecutionDispatcher;
use crate::error::ExecutionError;
use crate::types::{AgentConfig, ExecutionResult, ExecutionStatus};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Default recursion ceiling.
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Default feedback iteration cap.
pub const DEFAULT_MAX_FEEDBACK_ITERATIONS: u32 = 3;

fn feedback_key(execution_id: &str) -> String {
    format!("feedback-{execution_id}")
}

fn workflow_key(workflow_id: &str) -> String {
    format!("workflow-{workflow_id}")
}

/// Critique prompt built from a prior output.
#[must_use]
pub fn feedback_query(iteration: u32, previous_output: &str) -> String {
    format!(
        "Previous result (iteration {iteration}): {previous_output}\n\n\
         Please review and improve upon this result. \
         Fix any errors, add missing details, and enhance the quality."
    )
}

/// Owns the execution tree and breaker registry for one process.
pub struct RecursiveOrchestrator {
    dispatcher: Arc<ExecutionDispatcher>,
    tree: Mutex<ExecutionTree>,
    breakers: BreakerRegistry,
    max_depth: u32,
    max_feedback_iterations: u32,
}

impl RecursiveOrchestrator {
    /// Creates an orchestrator with default ceilings and breaker thresholds.
    #[must_use]
    pub fn new(dispatcher: Arc<ExecutionDispatcher>) -> Self {
        Self {
            dispatcher,
            tree: Mutex::new(ExecutionTree::new()),
            breakers: BreakerRegistry::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_feedback_iterations: DEFAULT_MAX_FEEDBACK_ITERATIONS,
        }
    }

    /// Creates an orchestrator using the `[recursion]` and `[circuit_breaker]` sections.
    #[must_use]
    pub fn from_config(dispatcher: Arc<ExecutionDispatcher>, config: &CoreConfig) -> Self {
        Self::new(dispatcher)
            .with_max_depth(config.recursion.max_depth)
            .with_max_feedback_iterations(config.recursion.max_feedback_iterations)
            .with_breakers(BreakerRegistry::new(
                config.circuit_breaker.failure_threshold,
                config.recovery_timeout(),
            ))
    }

    /// Sets the recursion ceiling.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the default feedback iteration cap.
    #[must_use]
    pub fn with_max_feedback_iterations(mut self, max_iterations: u32) -> Self {
        self.max_feedback_iterations = max_iterations;
        self
    }

    /// Replaces the breaker registry.
    #[must_use]
    pub fn with_breakers(mut self, breakers: BreakerRegistry) -> Self {
        self.breakers = breakers;
        self
    }

    /// Recursion ceiling.
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Breaker state for a protected key.
    #[must_use]
    pub fn breaker_state(&self, key: &str) -> CircuitState {
        self.breakers.state(key)
    }

    /// Stored depth of an agent (0 for roots).
    #[must_use]
    pub fn depth_of(&self, agent_id: &str) -> u32 {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner).depth_of(agent_id)
    }

    /// Number of spawned sub-agents.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Spawns a sub-agent for a subtask and runs it.
    ///
    /// # Arguments
    /// * `parent_agent_id` - Spawning agent; also the breaker key
    /// * `subtask` - Delegated work
    /// * `parent_config` - Config the child inherits
    /// * `caller_id` - Identity used for rate limiting
    pub async fn spawn_sub_agent(
        &self,
        parent_agent_id: &str,
        subtask: Subtask,
        parent_config: &AgentConfig,
        caller_id: &str,
    ) -> ExecutionResult {
        let Some(permit) = self.breakers.admit(parent_agent_id) else {
            let err = ExecutionError::CircuitOpen { key: parent_agent_id.to_string() };
            warn!(parent_agent_id = parent_agent_id, error = %err, "Sub-agent spawn refused");
            return ExecutionResult::failed(&err);
        };

        let sub_agent_id = uuid::Uuid::new_v4().to_string();
        let depth = {
            let mut tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
            let parent_depth = tree.depth_of(parent_agent_id);
            if parent_depth >= self.max_depth {
                drop(tree);
                let err = ExecutionError::RecursionDepthExceeded { max_depth: self.max_depth };
                warn!(parent_agent_id = parent_agent_id, depth = parent_depth, error = %err, "Sub-agent spawn refused");
                return ExecutionResult::failed(&err);
            }
            tree.insert(ExecutionTreeNode {
                agent_id: sub_agent_id.clone(),
                parent_agent_id: parent_agent_id.to_string(),
                subtask: subtask.clone(),
                depth: parent_depth + 1,
                created_at: Utc::now(),
                result: None,
            });
            parent_depth + 1
        };

        let mut child_config = parent_config.clone();
        child_config.agent_id = Some(sub_agent_id.clone());
        child_config.parent_agent_id = Some(parent_agent_id.to_string());
        if let Some(prompt) = &subtask.system_prompt {
            child_config.system_prompt.clone_from(prompt);
        }

        info!(
            parent_agent_id = parent_agent_id,
            sub_agent_id = %sub_agent_id,
            depth = depth,
            "Spawning sub-agent"
        );

        let result = self.dispatcher.execute(&child_config, &subtask.execution_input(), caller_id).await;

        self.tree
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_result(&sub_agent_id, ResultSnapshot::from(&result));

        if result.is_completed() {
            permit.succeed();
        } else {
            error!(
                sub_agent_id = %sub_agent_id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Sub-agent execution failed"
            );
            permit.fail();
        }

        result
    }

    /// Runs one critique-and-improve iteration over a prior result.
    ///
    /// Returns `previous_result` unchanged when the iteration cap is reached,
    /// the chain's breaker is open, the prior result did not complete, or
    /// the new attempt fails. On success the returned result carries the
    /// combined tokens and cost of both calls.
    ///
    /// # Arguments
    /// * `execution_id` - Identifies the feedback chain
    /// * `config` - Agent config to re-run
    /// * `previous_result` - Output to improve
    /// * `caller_id` - Identity used for rate limiting
    /// * `iteration` - Zero-based iteration number
    /// * `max_iterations` - Cap; `None` uses the configured default
    pub async fn feedback_loop(
        &self,
        execution_id: &str,
        config: &AgentConfig,
        previous_result: ExecutionResult,
        caller_id: &str,
        iteration: u32,
        max_iterations: Option<u32>,
    ) -> ExecutionResult {
        let max_iterations = max_iterations.unwrap_or(self.max_feedback_iterations);
        if iteration >= max_iterations {
            debug!(execution_id = execution_id, iteration = iteration, "Feedback loop reached iteration cap");
            return previous_result;
        }

        let key = feedback_key(execution_id);
        let Some(permit) = self.breakers.admit(&key) else {
            warn!(key = %key, "Feedback loop breaker open; keeping previous result");
            return previous_result;
        };

        let Some(previous_output) = previous_result.output_text().filter(|_| previous_result.is_completed())
        else {
            permit.fail();
            return previous_result;
        };

        let input = json!({ "query": feedback_query(iteration, previous_output) });
        let mut result = self.dispatcher.execute(config, &input, caller_id).await;

        if result.is_completed() {
            permit.succeed();
            result.tokens_used += previous_result.tokens_used;
            result.cost += previous_result.cost;
            debug!(execution_id = execution_id, iteration = iteration, "Feedback iteration improved result");
            result
        } else {
            permit.fail();
            warn!(
                execution_id = execution_id,
                iteration = iteration,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Feedback iteration failed; keeping previous result"
            );
            previous_result
        }
    }

    /// Runs feedback iterations from 0 until the cap or until an iteration
    /// leaves the result unchanged.
    pub async fn refine(
        &self,
        config: &AgentConfig,
        initial: ExecutionResult,
        caller_id: &str,
        max_iterations: Option<u32>,
    ) -> ExecutionResult {
        let chain_id = initial.execution_id.clone();
        let max_iterations = max_iterations.unwrap_or(self.max_feedback_iterations);
        let mut current = initial;

        for iteration in 0..max_iterations {
            let before = current.execution_id.clone();
            current = self
                .feedback_loop(&chain_id, config, current, caller_id, iteration, Some(max_iterations))
                .await;
            if current.execution_id == before {
                break;
            }
        }
        current
    }

    /// Rewrites the remaining steps of a workflow from its intermediate results.
    ///
    /// An errored last result replaces the next pending step with a retry
    /// variant carrying the error; a completed one injects its output as
    /// `previous_output` into every remaining step. The original steps are
    /// returned when there is nothing to do, the breaker is open, or the
    /// rewrite would exceed the size ceiling.
    ///
    /// # Arguments
    /// * `workflow_id` - Identifies the workflow breaker
    /// * `steps` - Full step list
    /// * `intermediate_results` - Results of the steps executed so far, in order
    /// * `caller_id` - Identity requesting the rewrite
    pub fn self_modify_workflow(
        &self,
        workflow_id: &str,
        steps: &[WorkflowStep],
        intermediate_results: &[ExecutionResult],
        caller_id: &str,
    ) -> Vec<WorkflowStep> {
        let Some(last) = intermediate_results.last() else {
            return steps.to_vec();
        };

        let completed_count = intermediate_results.len().min(steps.len());
        let (done, remaining) = steps.split_at(completed_count);
        if remaining.is_empty() {
            return steps.to_vec();
        }

        let key = workflow_key(workflow_id);
        let Some(permit) = self.breakers.admit(&key) else {
            warn!(workflow_id = workflow_id, "Workflow breaker open; returning original steps");
            return steps.to_vec();
        };

        let mut modified: Vec<WorkflowStep> = done.to_vec();
        match last.status {
            ExecutionStatus::Error => {
                permit.fail();
                let error = last.error.as_deref().unwrap_or("Unknown error");
                if let Some((pending, rest)) = remaining.split_first() {
                    modified.push(pending.retry_variant(error));
                    modified.extend_from_slice(rest);
                }
                info!(workflow_id = workflow_id, caller_id = caller_id, "Inserted retry for failed step");
            }
            ExecutionStatus::Completed => {
                permit.succeed();
                let output = last.output.clone().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                modified.extend(remaining.iter().map(|step| step.with_previous_output(&output)));
                debug!(
                    workflow_id = workflow_id,
                    caller_id = caller_id,
                    rewritten = remaining.len(),
                    "Injected previous output into remaining steps"
                );
            }
        }

        let ceiling = steps.len() + self.max_depth as usize;
        if modified.len() > ceiling {
            warn!(workflow_id = workflow_id, steps = modified.len(), ceiling = ceiling, "Workflow rewrite exceeded safety limit");
            return steps.to_vec();
        }

        modified
    }

    /// Nested view of an agent and its spawned descendants.
    #[must_use]
    pub fn get_execution_tree(&self, agent_id: &str) -> TreeView {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner).view(agent_id)
    }

    /// Clears the execution tree and every breaker.
    pub fn reset(&self) {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.breakers.clear();
        info!("Recursive orchestrator state reset");
    }
}

impl std::fmt::Debug for RecursiveOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveOrchestrator")
            .field("max_depth", &self.max_depth)
            .field("max_feedback_iterations", &self.max_feedback_iterations)
            .field("nodes", &self.node_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_models::AdapterRegistry;
    use std::time::Duration;

    fn orchestrator() -> RecursiveOrchestrator {
        RecursiveOrchestrator::new(Arc::new(ExecutionDispatcher::new(AdapterRegistry::new())))
    }

    fn completed(output: &str, tokens: u64, cost: f64) -> ExecutionResult {
        ExecutionResult {
            execution_id: uuid::Uuid::new_v4().to_string(),
            status: ExecutionStatus::Completed,
            output: Some(json!({ "result": output })),
            tokens_used: tokens,
            cost,
            duration_ms: 1,
            error: None,
        }
    }

    #[test]
    fn test_feedback_query_names_iteration() {
        let query = feedback_query(2, "draft");
        assert!(query.starts_with("Previous result (iteration 2): draft\n\n"));
        assert!(query.ends_with("enhance the quality."));
    }

    #[tokio::test]
    async fn test_spawn_records_node_and_inherits_config() {
        let orch = orchestrator();
        let result = orch
            .spawn_sub_agent("root", Subtask::new("look this up"), &AgentConfig::new("parent prompt"), "u1")
            .await;

        assert!(result.is_completed());
        assert_eq!(result.output_text(), Some("Agent execution simulated for input: look this up"));

        let view = orch.get_execution_tree("root");
        assert_eq!(view.children.len(), 1);
        let child = &view.children[0];
        assert_eq!(child.depth, 1);
        assert_eq!(child.result.as_ref().map(|r| r.execution_id.clone()), Some(result.execution_id));
    }

    #[tokio::test]
    async fn test_spawn_refused_at_max_depth() {
        let orch = orchestrator();
        let mut parent = "root".to_string();
        for _ in 0..5 {
            orch.spawn_sub_agent(&parent, Subtask::new("go deeper"), &AgentConfig::default(), "u1").await;
            parent = orch.get_execution_tree(&parent).children[0].agent_id.clone();
        }
        assert_eq!(orch.depth_of(&parent), 5);
        assert_eq!(orch.node_count(), 5);

        let refused = orch.spawn_sub_agent(&parent, Subtask::new("too deep"), &AgentConfig::default(), "u1").await;

        assert_eq!(refused.status, ExecutionStatus::Error);
        assert_eq!(refused.error.as_deref(), Some("Maximum recursion depth (5) exceeded."));
        assert_eq!(orch.node_count(), 5);
    }

    #[tokio::test]
    async fn test_feedback_at_cap_returns_previous() {
        let orch = orchestrator();
        let previous = completed("v1", 10, 0.01);

        let result = orch.feedback_loop("e1", &AgentConfig::default(), previous.clone(), "u1", 3, Some(3)).await;

        assert_eq!(result, previous);
        assert_eq!(orch.dispatcher.rate_limiter().in_flight("u1"), 0);
    }

    #[tokio::test]
    async fn test_feedback_accumulates_totals() {
        let orch = orchestrator();
        let previous = completed("v1", 10, 0.5);

        let result = orch.feedback_loop("e1", &AgentConfig::default(), previous.clone(), "u1", 0, None).await;

        assert_ne!(result.execution_id, previous.execution_id);
        assert_eq!(result.tokens_used, 10);
        assert!((result.cost - 0.5).abs() < 1e-12);
        assert!(result.output_text().unwrap_or_default().contains("Previous result (iteration 0): v1"));
    }

    #[tokio::test]
    async fn test_feedback_on_failed_previous_counts_failure() {
        let orch = orchestrator();
        let failed = ExecutionResult::failed(&ExecutionError::NoProviderAvailable);

        for _ in 0..5 {
            let out = orch.feedback_loop("e1", &AgentConfig::default(), failed.clone(), "u1", 0, None).await;
            assert_eq!(out, failed);
        }
        assert_eq!(orch.breaker_state("feedback-e1"), CircuitState::Open);
    }

    #[test]
    fn test_self_modify_without_results_is_noop() {
        let orch = orchestrator();
        let steps = vec![WorkflowStep::new("a"), WorkflowStep::new("b")];
        assert_eq!(orch.self_modify_workflow("w", &steps, &[], "u1"), steps);
        assert_eq!(orch.breaker_state("workflow-w"), CircuitState::Closed);
    }

    #[test]
    fn test_self_modify_retries_failed_step() {
        let orch = orchestrator();
        let steps = vec![WorkflowStep::new("a"), WorkflowStep::new("b"), WorkflowStep::new("c")];
        let failed = ExecutionResult::failed(&ExecutionError::NoProviderAvailable);

        let modified = orch.self_modify_workflow("w", &steps, &[failed], "u1");

        assert_eq!(modified.len(), 3);
        assert_eq!(modified[0], steps[0]);
        assert_eq!(modified[1].name, "b (retry)");
        assert!(modified[1].is_retry());
        assert_eq!(modified[1].config["retry_context"], json!("No model provider available"));
        assert_eq!(modified[2], steps[2]);
    }

    #[test]
    fn test_noop_rewrite_does_not_consume_recovery_trial() {
        let orch = orchestrator().with_breakers(BreakerRegistry::new(1, Duration::from_millis(20)));
        let steps = vec![WorkflowStep::new("a"), WorkflowStep::new("b")];
        let failed = ExecutionResult::failed(&ExecutionError::NoProviderAvailable);

        orch.self_modify_workflow("w", &steps, &[failed], "u1");
        assert_eq!(orch.breaker_state("workflow-w"), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(40));

        let done = [completed("x", 1, 0.0), completed("y", 1, 0.0)];
        assert_eq!(orch.self_modify_workflow("w", &steps, &done, "u1"), steps);
        assert_eq!(orch.breaker_state("workflow-w"), CircuitState::Open);

        let rewritten = orch.self_modify_workflow("w", &steps, &done[..1], "u1");
        assert!(rewritten[1].input_mapping.contains_key("previous_output"));
        assert_eq!(orch.breaker_state("workflow-w"), CircuitState::Closed);
    }

    #[test]
    fn test_reset_clears_state() {
        let orch = orchestrator();
        let failed = ExecutionResult::failed(&ExecutionError::NoProviderAvailable);
        let steps = vec![WorkflowStep::new("a"), WorkflowStep::new("b")];
        for _ in 0..5 {
            orch.self_modify_workflow("w", &steps, &[failed.clone()], "u1");
        }
        assert_eq!(orch.breaker_state("workflow-w"), CircuitState::Open);

        orch.reset();
        assert_eq!(orch.breaker_state("workflow-w"), CircuitState::Closed);
        assert_eq!(orch.node_count(), 0);
    }
}
