//! # Retry State Machine
//!
//! Tracks the attempts of one ingestion cycle.
//!
//! ```text
//!            begin_attempt()
//!   Idle ─────────────────────► InFlight (deadline = start + timeout)
//!                                  │
//!            record_failure()      │
//!   ┌──────────────────────────────┤
//!   ▼                              ▼
//!   Retry { delay }            GiveUp(last error)
//!   (attempt < max)            (attempt == max)
//! ```
//!
//! The backoff after the n-th failed attempt is `backoff_step × n`. The
//! machine performs no I/O and never sleeps; the driver owns the timers.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::IngestConfig;
use crate::error::FetchError;

/// Attempt limits for one ingestion cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per cycle, including the first
    pub max_attempts: u32,

    /// Deadline of each attempt
    pub attempt_timeout: Duration,

    /// Backoff unit; the wait after failure `n` is `n` units
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            backoff_step: Duration::from_millis(1200),
        }
    }
}

impl From<&IngestConfig> for RetryPolicy {
    fn from(config: &IngestConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            attempt_timeout: Duration::from_millis(config.request_timeout_ms),
            backoff_step: Duration::from_millis(config.backoff_step_ms),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `failed_attempts`-th consecutive failure
    pub fn backoff_after(&self, failed_attempts: u32) -> Duration {
        self.backoff_step * failed_attempts
    }
}

/// What the driver should do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then start another attempt
    Retry { delay: Duration },
    /// Attempts exhausted; report the last error
    GiveUp(FetchError),
}

/// Per-cycle retry state: attempt count, deadline and last error
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
    deadline: Option<Instant>,
    last_error: Option<FetchError>,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            deadline: None,
            last_error: None,
        }
    }

    /// Start the next attempt at `now`
    ///
    /// # Returns
    ///
    /// * `Instant` - Deadline after which the attempt counts as timed out
    pub fn begin_attempt(&mut self, now: Instant) -> Instant {
        self.attempt += 1;
        let deadline = now + self.policy.attempt_timeout;
        self.deadline = Some(deadline);
        deadline
    }

    /// Record a failed attempt and decide what happens next
    pub fn record_failure(&mut self, error: FetchError) -> RetryDecision {
        self.deadline = None;
        self.last_error = Some(error.clone());

        if self.attempt >= self.policy.max_attempts {
            RetryDecision::GiveUp(error)
        } else {
            RetryDecision::Retry {
                delay: self.policy.backoff_after(self.attempt),
            }
        }
    }

    /// Error for an attempt that ran into its deadline
    pub fn timeout_error(&self) -> FetchError {
        FetchError::Timeout(self.policy.attempt_timeout.as_millis() as u64)
    }

    /// Attempts started so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Deadline of the attempt in flight
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Most recent failure
    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(30));
        assert_eq!(policy.backoff_after(1), Duration::from_millis(1200));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(2400));
    }

    #[test]
    fn test_policy_from_config() {
        let config = IngestConfig {
            interval_ms: 5000,
            max_attempts: 5,
            request_timeout_ms: 1500,
            backoff_step_ms: 100,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.attempt_timeout, Duration::from_millis(1500));
        assert_eq!(policy.backoff_step, Duration::from_millis(100));
    }

    #[test]
    fn test_three_failures_give_up_with_last_error() {
        let mut state = RetryState::new(RetryPolicy::default());
        let now = Instant::now();

        state.begin_attempt(now);
        assert_eq!(
            state.record_failure(FetchError::Http(502)),
            RetryDecision::Retry { delay: Duration::from_millis(1200) }
        );

        state.begin_attempt(now);
        assert_eq!(
            state.record_failure(FetchError::Network("reset".to_string())),
            RetryDecision::Retry { delay: Duration::from_millis(2400) }
        );

        state.begin_attempt(now);
        assert_eq!(
            state.record_failure(FetchError::Timeout(30000)),
            RetryDecision::GiveUp(FetchError::Timeout(30000))
        );
        assert_eq!(state.attempts(), 3);
        assert_eq!(state.last_error(), Some(&FetchError::Timeout(30000)));
    }

    #[test]
    fn test_single_attempt_policy() {
        let mut state = RetryState::new(RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        });
        state.begin_attempt(Instant::now());
        assert!(matches!(
            state.record_failure(FetchError::Http(500)),
            RetryDecision::GiveUp(FetchError::Http(500))
        ));
    }

    #[test]
    fn test_deadline_tracks_attempt() {
        let mut state = RetryState::new(RetryPolicy::default());
        assert_eq!(state.deadline(), None);

        let start = Instant::now();
        let deadline = state.begin_attempt(start);
        assert_eq!(deadline, start + Duration::from_secs(30));
        assert_eq!(state.deadline(), Some(deadline));

        state.record_failure(FetchError::Http(500));
        assert_eq!(state.deadline(), None);
        assert_eq!(state.timeout_error(), FetchError::Timeout(30000));
    }
}
