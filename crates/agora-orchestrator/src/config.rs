//! TOML configuration for the execution core.

use agora_models::ProviderCredentials;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Per-caller admission control.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per window.
    pub max_requests: usize,
    /// Trailing window length.
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_requests: 60, window_seconds: 60 }
    }
}

/// Dispatch limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Hard ceiling on output tokens per request.
    pub max_tokens_per_request: u32,
    /// Timeout applied to every provider HTTP call.
    pub http_timeout_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { max_tokens_per_request: 4096, http_timeout_seconds: 120 }
    }
}

/// Recursion bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecursionConfig {
    /// Deepest allowed sub-agent (root is depth 0).
    pub max_depth: u32,
    /// Default iteration cap for feedback loops.
    pub max_feedback_iterations: u32,
}

impl Default for RecursionConfig {
    fn default() -> Self {
        Self { max_depth: 5, max_feedback_iterations: 3 }
    }
}

/// Circuit breaker thresholds, applied to every protected key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,
    /// Cooldown before a trial call is admitted.
    pub recovery_timeout_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, recovery_timeout_seconds: 60 }
    }
}

/// Background evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Hours between evaluation cycles.
    pub interval_hours: u64,
    /// Caller ID the evaluator dispatches under (subject to rate limiting).
    pub caller_id: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { interval_hours: 24, caller_id: "meta-agent-evaluator".to_string() }
    }
}

/// Complete core configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// `[rate_limit]`
    pub rate_limit: RateLimitConfig,
    /// `[dispatch]`
    pub dispatch: DispatchConfig,
    /// `[recursion]`
    pub recursion: RecursionConfig,
    /// `[circuit_breaker]`
    pub circuit_breaker: CircuitBreakerConfig,
    /// `[evaluation]`
    pub evaluation: EvaluationConfig,
    /// `[providers]`
    pub providers: ProviderCredentials,
}

impl CoreConfig {
    /// Rate-limit window as a `Duration`.
    #[must_use]
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_seconds)
    }

    /// Provider HTTP timeout as a `Duration`.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.http_timeout_seconds)
    }

    /// Breaker recovery timeout as a `Duration`.
    #[must_use]
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker.recovery_timeout_seconds)
    }

    /// Evaluation interval as a `Duration`, saturating on overflow.
    #[must_use]
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation.interval_hours.saturating_mul(3600))
    }

    /// Fills unset provider credentials from the environment.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        self.providers.fill_from_env();
        self
    }
}

/// Configuration loader for core settings.
pub struct CoreConfigLoader;

impl CoreConfigLoader {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<CoreConfig> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or fails validation.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<CoreConfig> {
        let config: CoreConfig = toml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validates configuration.
    ///
    /// # Errors
    /// Returns error naming the first invalid field.
    pub fn validate(config: &CoreConfig) -> Result<()> {
        let checks = [
            (config.rate_limit.max_requests == 0, "rate_limit.max_requests must be greater than 0"),
            (config.rate_limit.window_seconds == 0, "rate_limit.window_seconds must be greater than 0"),
            (
                config.dispatch.max_tokens_per_request == 0,
                "dispatch.max_tokens_per_request must be greater than 0",
            ),
            (
                config.dispatch.http_timeout_seconds == 0,
                "dispatch.http_timeout_seconds must be greater than 0",
            ),
            (config.recursion.max_depth == 0, "recursion.max_depth must be greater than 0"),
            (
                config.circuit_breaker.failure_threshold == 0,
                "circuit_breaker.failure_threshold must be greater than 0",
            ),
            (config.evaluation.interval_hours == 0, "evaluation.interval_hours must be greater than 0"),
        ];

        if let Some((_, message)) = checks.iter().find(|(invalid, _)| *invalid) {
            return Err(ConfigError::Validation((*message).to_string()));
        }
        Ok(())
    }
}
