//! Recurring background evaluation.

use super::evaluator::{EvaluationTarget, Evaluator};
use crate::config::CoreConfig;
use crate::error::SchedulerError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Default time between evaluation cycles.
pub const DEFAULT_EVALUATION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Runs an evaluation cycle immediately and then on a fixed interval.
///
/// Cancellation is cooperative: it is observed between agents and while
/// waiting for the next cycle, so an in-flight evaluation finishes first.
pub struct EvaluationScheduler {
    evaluator: Arc<Evaluator>,
    interval: Duration,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl EvaluationScheduler {
    /// Creates a stopped scheduler.
    #[must_use]
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self { evaluator, interval: DEFAULT_EVALUATION_INTERVAL, running: None }
    }

    /// Creates a stopped scheduler using `[evaluation] interval_hours`.
    #[must_use]
    pub fn from_config(evaluator: Arc<Evaluator>, config: &CoreConfig) -> Self {
        Self::new(evaluator).with_interval(config.evaluation_interval())
    }

    /// Interval between cycles.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sets the interval between cycles.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Whether a background task is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Spawns the background loop over a fixed set of agents.
    ///
    /// # Errors
    /// Returns `SchedulerError::AlreadyRunning` if a loop is active.
    pub fn start_background_evaluation(&mut self, targets: Vec<EvaluationTarget>) -> Result<(), SchedulerError> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let agents = targets.len();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let evaluator = Arc::clone(&self.evaluator);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            loop {
                evaluator.run_cycle(&targets, Some(&cancel)).await;

                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("Background evaluation stop signal received");
                        break;
                    }
                    () = tokio::time::sleep(interval) => {}
                }
            }
        });

        info!(agents = agents, interval_secs = interval.as_secs(), "Background evaluation started");
        self.running = Some((token, handle));
        Ok(())
    }

    /// Signals the loop to stop and returns without waiting.
    ///
    /// # Errors
    /// Returns `SchedulerError::NotRunning` if no loop is active.
    pub fn stop_background_evaluation(&mut self) -> Result<(), SchedulerError> {
        let (token, _handle) = self.running.take().ok_or(SchedulerError::NotRunning)?;
        token.cancel();
        info!("Background evaluation stop requested");
        Ok(())
    }

    /// Signals the loop to stop and waits for the current evaluation to finish.
    ///
    /// # Errors
    /// Returns `SchedulerError::NotRunning` if no loop is active.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        let (token, handle) = self.running.take().ok_or(SchedulerError::NotRunning)?;
        token.cancel();
        // A panicked or aborted task has already stopped.
        let _ = handle.await;
        info!("Background evaluation stopped");
        Ok(())
    }
}

impl Drop for EvaluationScheduler {
    fn drop(&mut self) {
        if let Some((token, _)) = self.running.take() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for EvaluationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationScheduler")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
