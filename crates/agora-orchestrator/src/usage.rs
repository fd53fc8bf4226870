//! Usage recording sinks.

use crate::types::ExecutionStatus;
use agora_abstraction::ProviderId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// One usage entry written after a provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Execution the entry belongs to.
    pub execution_id: String,
    /// Catalog agent, when known.
    pub agent_id: Option<String>,
    /// Caller the execution was admitted for.
    pub caller_id: String,
    /// Provider that served the call.
    pub provider: ProviderId,
    /// Model that served the call.
    pub model: String,
    /// Prompt tokens.
    pub tokens_input: u64,
    /// Completion tokens.
    pub tokens_output: u64,
    /// Cost in USD.
    pub cost: f64,
    /// Wall-clock latency.
    pub latency_ms: u64,
    /// Outcome of the call.
    pub status: ExecutionStatus,
    /// When the entry was produced.
    pub recorded_at: DateTime<Utc>,
}

/// Destination for usage entries. Failures are logged by the caller and
/// never surface to the execution that produced the entry.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Writes one entry.
    ///
    /// # Errors
    /// Returns a description of the failure when the entry could not be stored.
    async fn record(&self, record: UsageRecord) -> Result<(), String>;
}

/// Emits each entry as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: UsageRecord) -> Result<(), String> {
        info!(
            execution_id = %record.execution_id,
            agent_id = record.agent_id.as_deref().unwrap_or("-"),
            caller_id = %record.caller_id,
            provider = %record.provider,
            model = %record.model,
            tokens_input = record.tokens_input,
            tokens_output = record.tokens_output,
            cost = record.cost,
            latency_ms = record.latency_ms,
            status = %record.status,
            "Usage recorded"
        );
        Ok(())
    }
}

/// Keeps every entry in memory.
#[derive(Debug, Default)]
pub struct InMemoryUsageSink {
    records: Mutex<Vec<UsageRecord>>,
}

impl InMemoryUsageSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Total cost across all entries.
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).iter().map(|r| r.cost).sum()
    }
}

#[async_trait]
impl UsageSink for InMemoryUsageSink {
    async fn record(&self, record: UsageRecord) -> Result<(), String> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cost: f64) -> UsageRecord {
        UsageRecord {
            execution_id: "e1".to_string(),
            agent_id: Some("agent-1".to_string()),
            caller_id: "u1".to_string(),
            provider: ProviderId::OpenAI,
            model: "gpt-4o".to_string(),
            tokens_input: 10,
            tokens_output: 20,
            cost,
            latency_ms: 5,
            status: ExecutionStatus::Completed,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_sink_accumulates() {
        let sink = InMemoryUsageSink::new();
        sink.record(record(0.25)).await.unwrap();
        sink.record(record(0.5)).await.unwrap();

        assert_eq!(sink.records().len(), 2);
        assert!((sink.total_cost() - 0.75).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        assert!(TracingUsageSink.record(record(0.0)).await.is_ok());
    }
}
