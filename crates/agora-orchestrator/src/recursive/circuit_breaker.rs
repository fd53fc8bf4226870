//! Failure-isolation state machine, one instance per protected key.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default consecutive failures before the breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown before a trial call is admitted.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Rejecting until the recovery timeout elapses.
    Open,
    /// One trial call admitted.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Consecutive-failure circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    key: String,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    /// Set once the single half-open trial has been handed out.
    trial_in_flight: bool,
    trial_started: Option<Instant>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    ///
    /// # Arguments
    /// * `key` - Protected key, used in logs
    /// * `failure_threshold` - Consecutive failures before opening
    /// * `recovery_timeout` - Cooldown before a trial call
    #[must_use]
    pub fn new(key: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            key: key.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            trial_in_flight: false,
            trial_started: None,
            failure_threshold,
            recovery_timeout,
        }
    }

    /// Protected key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state, without applying any cooldown transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consecutive failures since the last success.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Successes recorded over the breaker's lifetime.
    #[must_use]
    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    /// Resets the failure count; a half-open breaker closes.
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.success_count += 1;
        self.trial_in_flight = false;
        self.trial_started = None;
        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Closed;
            info!(key = %self.key, "Circuit breaker: HalfOpen -> Closed (recovery successful)");
        }
    }

    /// Counts a failure; opens at the threshold or when the trial fails.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure = Some(Instant::now());
        self.trial_in_flight = false;
        self.trial_started = None;

        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                warn!(key = %self.key, "Circuit breaker: HalfOpen -> Open (trial failed)");
            }
            CircuitState::Closed if self.failure_count >= self.failure_threshold => {
                self.state = CircuitState::Open;
                warn!(
                    key = %self.key,
                    failures = self.failure_count,
                    threshold = self.failure_threshold,
                    "Circuit breaker: Closed -> Open (failure threshold reached)"
                );
            }
            _ => {}
        }
    }

    /// Whether a call may proceed.
    ///
    /// An open breaker moves to half-open once the recovery timeout has
    /// elapsed since the last failure and admits exactly one trial; further
    /// calls are refused until that trial's outcome is recorded. A trial
    /// whose outcome never arrives within another recovery timeout is
    /// treated as abandoned and the slot is handed out again.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = self.last_failure.is_none_or(|at| at.elapsed() >= self.recovery_timeout);
                if cooled {
                    self.state = CircuitState::HalfOpen;
                    self.start_trial();
                    info!(key = %self.key, "Circuit breaker: Open -> HalfOpen (admitting trial)");
                }
                cooled
            }
            CircuitState::HalfOpen => {
                let stale = self.trial_started.is_none_or(|at| at.elapsed() >= self.recovery_timeout);
                if self.trial_in_flight && !stale {
                    return false;
                }
                if self.trial_in_flight {
                    warn!(key = %self.key, "Circuit breaker: abandoned trial, admitting another");
                }
                self.start_trial();
                true
            }
        }
    }

    /// Frees the half-open trial slot without recording an outcome.
    pub fn release_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
            self.trial_started = None;
        }
    }

    fn start_trial(&mut self) {
        self.trial_in_flight = true;
        self.trial_started = Some(Instant::now());
    }

    /// Returns the breaker to a fresh closed state.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.last_failure = None;
        self.trial_in_flight = false;
        self.trial_started = None;
    }
}

/// Admission granted by [`BreakerRegistry::admit`].
///
/// Resolve it with [`Self::succeed`] or [`Self::fail`]. A permit dropped
/// unresolved, e.g. when the caller's future is cancelled mid-call, frees
/// the half-open trial slot without counting a failure.
#[must_use = "an admitted call must report its outcome"]
pub struct BreakerPermit {
    breaker: Arc<Mutex<CircuitBreaker>>,
    resolved: bool,
}

impl BreakerPermit {
    /// Records a success for the admitted call.
    pub fn succeed(mut self) {
        self.resolved = true;
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner).record_success();
    }

    /// Records a failure for the admitted call.
    pub fn fail(mut self) {
        self.resolved = true;
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner).record_failure();
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.lock().unwrap_or_else(PoisonError::into_inner).release_trial();
        }
    }
}

impl fmt::Debug for BreakerPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerPermit").field("resolved", &self.resolved).finish_non_exhaustive()
    }
}

/// Lazily created breakers keyed by protected key.
///
/// Each key has its own lock, so unrelated lineages never contend beyond the
/// brief map lookup.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<Mutex<CircuitBreaker>>>>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl BreakerRegistry {
    /// Creates an empty registry whose breakers share the given thresholds.
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self { breakers: Mutex::new(HashMap::new()), failure_threshold, recovery_timeout }
    }

    /// Breaker for a key, created closed on first use.
    pub fn get(&self, key: &str) -> Arc<Mutex<CircuitBreaker>> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(breakers.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(CircuitBreaker::new(key, self.failure_threshold, self.recovery_timeout)))
        }))
    }

    /// Whether a call under `key` may proceed.
    pub fn can_execute(&self, key: &str) -> bool {
        self.get(key).lock().unwrap_or_else(PoisonError::into_inner).can_execute()
    }

    /// Admits a call under `key`, or `None` if the breaker refuses it.
    pub fn admit(&self, key: &str) -> Option<BreakerPermit> {
        let breaker = self.get(key);
        let allowed = breaker.lock().unwrap_or_else(PoisonError::into_inner).can_execute();
        allowed.then(|| BreakerPermit { breaker, resolved: false })
    }

    /// Records a success under `key`.
    pub fn record_success(&self, key: &str) {
        self.get(key).lock().unwrap_or_else(PoisonError::into_inner).record_success();
    }

    /// Records a failure under `key`.
    pub fn record_failure(&self, key: &str) {
        self.get(key).lock().unwrap_or_else(PoisonError::into_inner).record_failure();
    }

    /// State of a key's breaker; keys never seen are closed.
    #[must_use]
    pub fn state(&self, key: &str) -> CircuitState {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .get(key)
            .map_or(CircuitState::Closed, |b| b.lock().unwrap_or_else(PoisonError::into_inner).state())
    }

    /// Drops every breaker.
    pub fn clear(&self) {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn open_breaker(timeout: Duration) -> CircuitBreaker {
        let mut breaker = CircuitBreaker::new("k", 3, timeout);
        for _ in 0..3 {
            breaker.record_failure();
        }
        breaker
    }

    #[test]
    fn test_opens_at_threshold() {
        let mut breaker = CircuitBreaker::new("k", 3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut breaker = CircuitBreaker::new("k", 3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.failure_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_single_trial_after_recovery_timeout() {
        let mut breaker = open_breaker(Duration::from_millis(30));
        assert!(!breaker.can_execute());

        thread::sleep(Duration::from_millis(50));

        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_half_open_success_closes() {
        let mut breaker = open_breaker(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_execute());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut breaker = open_breaker(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_registry_isolates_keys() {
        let registry = BreakerRegistry::new(2, Duration::from_secs(60));
        registry.record_failure("a");
        registry.record_failure("a");

        assert_eq!(registry.state("a"), CircuitState::Open);
        assert!(!registry.can_execute("a"));
        assert!(registry.can_execute("b"));
        assert_eq!(registry.state("never-seen"), CircuitState::Closed);

        registry.clear();
        assert!(registry.can_execute("a"));
    }

    #[test]
    fn test_abandoned_trial_is_readmitted_after_timeout() {
        let mut breaker = open_breaker(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_execute());
        assert!(!breaker.can_execute());

        thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_dropped_permit_frees_trial_slot() {
        let registry = BreakerRegistry::new(1, Duration::from_millis(10));
        registry.record_failure("a");
        thread::sleep(Duration::from_millis(20));

        let permit = registry.admit("a");
        assert!(permit.is_some());
        assert!(registry.admit("a").is_none());
        drop(permit);

        assert_eq!(registry.state("a"), CircuitState::HalfOpen);
        let trial = registry.admit("a").expect("slot released");
        trial.succeed();
        assert_eq!(registry.state("a"), CircuitState::Closed);
    }

    #[test]
    fn test_permit_failure_reopens() {
        let registry = BreakerRegistry::new(1, Duration::from_millis(10));
        registry.record_failure("a");
        thread::sleep(Duration::from_millis(20));

        registry.admit("a").expect("trial admitted").fail();
        assert_eq!(registry.state("a"), CircuitState::Open);
        assert!(registry.admit("a").is_none());
    }

    #[test]
    fn test_reset() {
        let mut breaker = open_breaker(Duration::from_secs(60));
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.can_execute());
    }
}
