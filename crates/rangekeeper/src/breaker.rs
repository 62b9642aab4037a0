//! Counts non-fatal errors in a time window and halts on fatal classes.

use crate::error::CoreError;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    window_duration: Duration,
    threshold: u32,
    recent_error_times: VecDeque<Instant>,
    fatal_latched: bool,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        // 5 errors within 5 minutes trips the breaker.
        Self::new(Duration::from_secs(5 * 60), 5)
    }
}

impl CircuitBreaker {
    pub fn new(window_duration: Duration, threshold: u32) -> Self {
        Self {
            window_duration,
            threshold,
            recent_error_times: VecDeque::new(),
            fatal_latched: false,
        }
    }

    /// Record an error observed `now`. Returns `true` iff the breaker
    /// halts: immediately for a fatal error, or once the pruned window
    /// holds `>= threshold` transient errors.
    pub fn record(&mut self, err: &CoreError, now: Instant) -> bool {
        if err.is_fatal() {
            self.fatal_latched = true;
            return true;
        }
        self.prune(now);
        self.recent_error_times.push_back(now);
        self.recent_error_times.len() as u32 >= self.threshold
    }

    pub fn is_halted(&self) -> bool {
        self.fatal_latched
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.recent_error_times.front() {
            if now.duration_since(front) > self.window_duration {
                self.recent_error_times.pop_front();
            } else {
                break;
            }
        }
    }
}
