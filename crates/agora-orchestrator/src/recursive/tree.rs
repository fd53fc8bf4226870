//! In-memory arena of spawned sub-agents.

use crate::types::{ExecutionResult, ExecutionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Work delegated to a sub-agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Subtask {
    /// Human-readable description; becomes the query when `input` is absent.
    #[serde(default)]
    pub description: String,
    /// Explicit execution input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Overrides the parent's system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Subtask {
    /// Creates a subtask from a description.
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), ..Self::default() }
    }

    /// Sets an explicit input.
    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    /// Sets a system prompt override.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Input dispatched for this subtask.
    #[must_use]
    pub fn execution_input(&self) -> Value {
        self.input.clone().unwrap_or_else(|| serde_json::json!({ "query": self.description }))
    }
}

/// Summary of a sub-agent's execution kept on its node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    /// Execution ID.
    pub execution_id: String,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Tokens consumed.
    pub tokens_used: u64,
    /// Cost in USD.
    pub cost: f64,
}

impl From<&ExecutionResult> for ResultSnapshot {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            execution_id: result.execution_id.clone(),
            status: result.status,
            tokens_used: result.tokens_used,
            cost: result.cost,
        }
    }
}

/// One spawned sub-agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTreeNode {
    /// Sub-agent ID.
    pub agent_id: String,
    /// Spawning agent. A back-reference only; parents need not be nodes.
    pub parent_agent_id: String,
    /// Delegated work.
    pub subtask: Subtask,
    /// Depth at creation; roots are 0, so every node is at least 1.
    pub depth: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Outcome, once the execution returns.
    pub result: Option<ResultSnapshot>,
}

/// Nested view of an agent and its descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeView {
    /// Agent at this level.
    pub agent_id: String,
    /// Subtask, for spawned agents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask: Option<Subtask>,
    /// Stored depth (0 for agents that are not nodes).
    pub depth: u32,
    /// Result snapshot, for spawned agents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultSnapshot>,
    /// Direct children in spawn order.
    pub children: Vec<TreeView>,
}

impl TreeView {
    /// Number of descendants below this level.
    #[must_use]
    pub fn descendant_count(&self) -> usize {
        self.children.iter().map(|c| 1 + c.descendant_count()).sum()
    }
}

/// Arena of nodes indexed by sub-agent ID, with a parent → children index.
#[derive(Debug, Default)]
pub struct ExecutionTree {
    nodes: HashMap<String, ExecutionTreeNode>,
    children: HashMap<String, Vec<String>>,
}

impl ExecutionTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored depth of an agent; agents that are not nodes are roots.
    #[must_use]
    pub fn depth_of(&self, agent_id: &str) -> u32 {
        self.nodes.get(agent_id).map_or(0, |n| n.depth)
    }

    /// Inserts a node and indexes it under its parent.
    pub fn insert(&mut self, node: ExecutionTreeNode) {
        self.children.entry(node.parent_agent_id.clone()).or_default().push(node.agent_id.clone());
        self.nodes.insert(node.agent_id.clone(), node);
    }

    /// Attaches a result snapshot to a node.
    pub fn set_result(&mut self, agent_id: &str, result: ResultSnapshot) {
        if let Some(node) = self.nodes.get_mut(agent_id) {
            node.result = Some(result);
        }
    }

    /// Looks up a node.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<&ExecutionTreeNode> {
        self.nodes.get(agent_id)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Builds the nested view rooted at `agent_id`.
    #[must_use]
    pub fn view(&self, agent_id: &str) -> TreeView {
        let node = self.nodes.get(agent_id);
        let children = self
            .children
            .get(agent_id)
            .map(|ids| ids.iter().map(|id| self.view(id)).collect())
            .unwrap_or_default();

        TreeView {
            agent_id: agent_id.to_string(),
            subtask: node.map(|n| n.subtask.clone()),
            depth: node.map_or(0, |n| n.depth),
            result: node.and_then(|n| n.result.clone()),
            children,
        }
    }

    /// Removes every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.children.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, parent: &str, depth: u32) -> ExecutionTreeNode {
        ExecutionTreeNode {
            agent_id: id.to_string(),
            parent_agent_id: parent.to_string(),
            subtask: Subtask::new(format!("task {id}")),
            depth,
            created_at: Utc::now(),
            result: None,
        }
    }

    #[test]
    fn test_subtask_input_defaults_to_query() {
        assert_eq!(Subtask::new("find it").execution_input(), json!({"query": "find it"}));
        assert_eq!(Subtask::new("x").with_input(json!({"a": 1})).execution_input(), json!({"a": 1}));
    }

    #[test]
    fn test_view_nests_children() {
        let mut tree = ExecutionTree::new();
        tree.insert(node("a", "root", 1));
        tree.insert(node("b", "a", 2));
        tree.insert(node("c", "root", 1));

        let view = tree.view("root");
        assert_eq!(view.depth, 0);
        assert!(view.subtask.is_none());
        assert_eq!(view.children.len(), 2);
        assert_eq!(view.children[0].agent_id, "a");
        assert_eq!(view.children[0].children[0].agent_id, "b");
        assert_eq!(view.children[0].children[0].depth, 2);
        assert_eq!(view.descendant_count(), 3);
    }

    #[test]
    fn test_stored_depth_is_authoritative() {
        let mut tree = ExecutionTree::new();
        tree.insert(node("orphan", "missing-parent", 4));
        assert_eq!(tree.depth_of("orphan"), 4);
        assert_eq!(tree.depth_of("missing-parent"), 0);
    }
}
