//! Retry policy for failed send attempts.
//!
//! Delay before the next attempt after `attempts` completed attempts:
//!
//! `min(base * 2^attempts, cap) + jitter`, with jitter drawn uniformly from
//! `[0, jitter_max]` so that items failing together do not retry together.
//!
//! | Attempts | Delay (base=2s, cap=300s, no jitter) |
//! |----------|--------------------------------------|
//! | 0        | 2s                                   |
//! | 1        | 4s                                   |
//! | 2        | 8s                                   |
//! | 7        | 256s                                 |
//! | 8+       | 300s                                 |

use rand::Rng;
use std::time::Duration;

/// Classification of a failed send attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Timeout, network failure, server-side error. Worth retrying.
    Transient,
    /// Payload rejected. Never retried.
    Permanent,
}

/// Why an item ended up Failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailureReason {
    /// The remote service rejected the payload.
    Rejected(String),
    /// Transient errors kept recurring until the attempt budget ran out.
    ExhaustedRetries { attempts: u32, last_error: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Rejected(reason) => write!(f, "rejected: {reason}"),
            FailureReason::ExhaustedRetries {
                attempts,
                last_error,
            } => write!(f, "gave up after {attempts} attempts: {last_error}"),
        }
    }
}

/// What to do with an item after a failed attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    /// Return to Pending, eligible again after this delay.
    RetryAfter(Duration),
    /// Move to Failed.
    GiveUp(FailureReason),
}

/// Backoff and give-up parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub base: Duration,
    /// Cap on the exponential part of the delay.
    pub cap: Duration,
    /// Upper bound of the random offset added to every delay.
    pub jitter_max: Duration,
    /// Attempts allowed before a transiently failing item is marked Failed.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(300),
            jitter_max: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Exponential delay without jitter, capped.
    pub fn base_delay(&self, attempts: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let cap_ms = self.cap.as_millis() as u64;
        let multiplier = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(multiplier).min(cap_ms);

        Duration::from_millis(delay_ms)
    }

    /// Delay before the next attempt, jitter included.
    pub fn backoff(&self, attempts: u32) -> Duration {
        self.base_delay(attempts) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.jitter_max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    /// Decide the fate of an item whose attempt just failed.
    ///
    /// `attempts` counts the attempts completed before this one.
    pub fn decide(&self, attempts: u32, class: ErrorClass, error: &str) -> RetryDecision {
        match class {
            ErrorClass::Permanent => RetryDecision::GiveUp(FailureReason::Rejected(error.to_string())),
            ErrorClass::Transient if attempts.saturating_add(1) < self.max_attempts => {
                RetryDecision::RetryAfter(self.backoff(attempts))
            }
            ErrorClass::Transient => RetryDecision::GiveUp(FailureReason::ExhaustedRetries {
                attempts: attempts.saturating_add(1),
                last_error: error.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(10),
            jitter_max: Duration::ZERO,
            max_attempts,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = no_jitter(10);

        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(10));
        assert_eq!(policy.backoff(64), Duration::from_secs(10));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn default_policy_delays() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.base_delay(0), Duration::from_secs(2));
        assert_eq!(policy.base_delay(7), Duration::from_secs(256));
        assert_eq!(policy.base_delay(8), Duration::from_secs(300));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            jitter_max: Duration::from_millis(250),
            ..no_jitter(10)
        };

        for _ in 0..200 {
            let delay = policy.backoff(1);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_millis(4_250));
        }
    }

    #[test]
    fn permanent_errors_give_up_immediately() {
        let policy = no_jitter(10);

        assert_eq!(
            policy.decide(0, ErrorClass::Permanent, "missing team number"),
            RetryDecision::GiveUp(FailureReason::Rejected("missing team number".into()))
        );
    }

    #[test]
    fn transient_errors_retry_until_budget_is_spent() {
        let policy = no_jitter(3);

        assert_eq!(
            policy.decide(0, ErrorClass::Transient, "503"),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(
            policy.decide(1, ErrorClass::Transient, "503"),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
        assert_eq!(
            policy.decide(2, ErrorClass::Transient, "503"),
            RetryDecision::GiveUp(FailureReason::ExhaustedRetries {
                attempts: 3,
                last_error: "503".into(),
            })
        );
    }

    #[test]
    fn single_attempt_budget_never_retries() {
        let policy = no_jitter(1);
        assert!(matches!(
            policy.decide(0, ErrorClass::Transient, "timeout"),
            RetryDecision::GiveUp(_)
        ));
    }

    #[test]
    fn failure_reason_display() {
        assert_eq!(FailureReason::Rejected("bad".into()).to_string(), "rejected: bad");
        assert_eq!(
            FailureReason::ExhaustedRetries {
                attempts: 5,
                last_error: "timeout".into()
            }
            .to_string(),
            "gave up after 5 attempts: timeout"
        );
    }
}
