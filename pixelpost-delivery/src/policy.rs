//! Retry and dead-letter policy.
//!
//! Bounded, linear and deterministic: the k-th failure of an item schedules
//! it `k * backoff_step_secs` after the failure, and the failure that would
//! bring `attempts` to `max_attempts` moves it to the dead-letter table
//! instead. There is no jitter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failures allowed before an item is dead-lettered.
    ///
    /// Default: 5
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step, in seconds.
    ///
    /// Default: 60
    #[serde(default = "defaults::backoff_step_secs")]
    pub backoff_step_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            backoff_step_secs: defaults::backoff_step_secs(),
        }
    }
}

/// What to do with a row whose delivery just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Reschedule { attempts: u32, next_attempt_at: u64 },
    DeadLetter { attempts: u32 },
}

impl RetryPolicy {
    /// Decide the fate of a row that had `attempts` prior failures and just failed at `now`.
    ///
    /// The attempt counter is incremented before the delay is computed, so
    /// the first failure waits one backoff step.
    #[must_use]
    pub fn on_failure(&self, attempts: u32, now: u64) -> RetryDecision {
        let attempts = attempts.saturating_add(1);
        if attempts >= self.max_attempts {
            return RetryDecision::DeadLetter { attempts };
        }

        RetryDecision::Reschedule {
            attempts,
            next_attempt_at: now.saturating_add(self.delay_secs(attempts)),
        }
    }

    /// Backoff applied once a row has failed `attempts` times.
    #[must_use]
    pub fn delay_secs(&self, attempts: u32) -> u64 {
        self.backoff_step_secs.saturating_mul(u64::from(attempts))
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        5
    }

    pub const fn backoff_step_secs() -> u64 {
        60
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_step_secs, 60);
    }

    #[test]
    fn backoff_is_linear_in_attempts() {
        let policy = RetryPolicy::default();
        let now = 1_000;

        for (prior, expected_delay) in [(0, 60), (1, 120), (2, 180), (3, 240)] {
            assert_eq!(
                policy.on_failure(prior, now),
                RetryDecision::Reschedule {
                    attempts: prior + 1,
                    next_attempt_at: now + expected_delay,
                }
            );
        }
    }

    #[test]
    fn fifth_failure_dead_letters() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.on_failure(4, 1_000),
            RetryDecision::DeadLetter { attempts: 5 }
        );
    }

    #[test]
    fn never_reschedules_at_or_beyond_the_limit() {
        let policy = RetryPolicy::default();
        for prior in 0..20 {
            if let RetryDecision::Reschedule { attempts, .. } = policy.on_failure(prior, 0) {
                assert!(attempts < policy.max_attempts);
            }
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: RetryPolicy = ron::from_str("(backoff_step_secs: 30)").expect("parse");
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_secs(2), 60);
    }
}
