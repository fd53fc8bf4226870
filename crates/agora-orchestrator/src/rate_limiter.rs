//! Per-caller sliding-window admission control.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: usize = 60;

/// Default trailing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter keyed by caller ID.
///
/// Each caller owns an ordered queue of request instants. Entries older than
/// the window are pruned on every check, so a queue never holds stale
/// timestamps after `allow` returns. Callers with nothing left in their
/// window are swept at most once per window length.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<Windows>,
    /// Requests admitted per window.
    max_requests: usize,
    /// Trailing window length.
    window: Duration,
}

#[derive(Debug)]
struct Windows {
    /// Request instants per caller, oldest first.
    callers: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl Windows {
    fn sweep(&mut self, now: Instant, window: Duration) {
        self.callers
            .retain(|_, timestamps| timestamps.back().is_some_and(|&newest| now.duration_since(newest) < window));
        self.last_sweep = now;
    }
}

impl RateLimiter {
    /// Creates a limiter.
    ///
    /// # Arguments
    /// * `max_requests` - Requests admitted per caller within `window`
    /// * `window` - Trailing window length
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            state: Mutex::new(Windows { callers: HashMap::new(), last_sweep: Instant::now() }),
            max_requests,
            window,
        }
    }

    /// Admits the call and records it iff the caller is under quota.
    pub fn allow(&self, caller_id: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if now.duration_since(state.last_sweep) >= self.window {
            state.sweep(now, self.window);
        }

        let timestamps = state.callers.entry(caller_id.to_string()).or_default();
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            debug!(caller_id = caller_id, in_window = timestamps.len(), "Rate limit reached");
            if timestamps.is_empty() {
                state.callers.remove(caller_id);
            }
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Requests currently counted against a caller (without pruning).
    #[must_use]
    pub fn in_flight(&self, caller_id: &str) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.callers.get(caller_id).map_or(0, VecDeque::len)
    }

    /// Number of callers currently tracked.
    #[must_use]
    pub fn tracked_callers(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).callers.len()
    }

    /// Drops every caller with no request inside the window.
    pub fn sweep(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).sweep(Instant::now(), self.window);
    }

    /// Forgets every caller.
    pub fn reset(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).callers.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}
