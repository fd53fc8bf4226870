//! Workflow step representation used by self-modification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_step_name() -> String {
    "Step".to_string()
}

/// One step of a catalog workflow.
///
/// Only the fields the core rewrites are typed; anything else the catalog
/// stores on a step is carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Display name.
    #[serde(default = "default_step_name")]
    pub name: String,
    /// Agent that executes the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Step-level configuration.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Maps step inputs to upstream values.
    #[serde(default)]
    pub input_mapping: Map<String, Value>,
    /// Unrecognised fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowStep {
    /// Creates a step with empty config and input mapping.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_id: None,
            config: Map::new(),
            input_mapping: Map::new(),
            extra: Map::new(),
        }
    }

    /// Sets the executing agent.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Adds one input mapping entry.
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input_mapping.insert(key.into(), value);
        self
    }

    /// Retry variant carrying the error that triggered it.
    #[must_use]
    pub fn retry_variant(&self, error: &str) -> Self {
        let mut retry = self.clone();
        retry.name = format!("{} (retry)", self.name);
        retry.config.insert("retry_context".to_string(), Value::String(error.to_string()));
        retry.config.insert("is_retry".to_string(), Value::Bool(true));
        retry
    }

    /// Copy whose input mapping exposes the previous step's output.
    #[must_use]
    pub fn with_previous_output(&self, output: &Value) -> Self {
        let mut step = self.clone();
        step.input_mapping.insert("previous_output".to_string(), output.clone());
        step
    }

    /// Whether this step was produced as a retry.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.config.get("is_retry").and_then(Value::as_bool).unwrap_or(false)
    }
}
