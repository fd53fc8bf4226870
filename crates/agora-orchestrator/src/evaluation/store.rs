//! Persistence seam for evaluation results.

use super::evaluator::EvaluationResult;
use crate::error::EvaluationError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Latest-wins store of evaluation results keyed by agent ID.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Stores a result, replacing any earlier one for the same agent.
    ///
    /// # Errors
    /// Returns `EvaluationError::Store` when the write fails.
    async fn save(&self, result: EvaluationResult) -> Result<(), EvaluationError>;

    /// Latest result for an agent.
    ///
    /// # Errors
    /// Returns `EvaluationError::Store` when the read fails.
    async fn latest(&self, agent_id: &str) -> Result<Option<EvaluationResult>, EvaluationError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryEvaluationStore {
    results: RwLock<HashMap<String, EvaluationResult>>,
}

impl InMemoryEvaluationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of agents with a stored result.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EvaluationStore for InMemoryEvaluationStore {
    async fn save(&self, result: EvaluationResult) -> Result<(), EvaluationError> {
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(result.agent_id.clone(), result);
        Ok(())
    }

    async fn latest(&self, agent_id: &str) -> Result<Option<EvaluationResult>, EvaluationError> {
        Ok(self.results.read().unwrap_or_else(PoisonError::into_inner).get(agent_id).cloned())
    }
}
