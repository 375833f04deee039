//! Bounded retry policy.
//!
//! A [`RetryPolicy`] answers two questions for the RPC invoker: may another
//! attempt be made after attempt `n` failed, and how long to wait before
//! attempt `n`. Attempts are numbered from zero; the first try is attempt `0`
//! and `max_retries` retries follow at most, so attempts `0..=max_retries` run.
//!
//! Delays are strictly positive for every retry, whatever the configuration,
//! so a caller facing an unreachable master blocks instead of spinning.

use std::time::Duration;

use rand::Rng;

use crate::config::{BackoffConfig, ClientConfig};

/// Floor for every retry delay, so an unreachable master never causes a busy loop.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Retry decisions derived from a [`ClientConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: BackoffConfig,
}

impl RetryPolicy {
    /// Policy allowing `max_retries` retries spaced by `backoff`.
    #[must_use]
    pub fn new(max_retries: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Policy matching a client configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retries, config.backoff.clone())
    }

    /// Maximum retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether attempt `attempt + 1` is permitted after attempt `attempt` failed.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay to wait before running `attempt`.
    ///
    /// Attempt `0` runs immediately. Every later attempt waits at least the
    /// strategy's minimum delay and never less than [`MIN_RETRY_DELAY`], even
    /// for an unvalidated config with zero delays.
    #[must_use]
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match &self.backoff {
            BackoffConfig::Fixed { delay } => *delay,
            BackoffConfig::Exponential {
                base_delay,
                max_delay,
                multiplier,
                jitter,
            } => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let base = base_delay.as_secs_f64() * multiplier.powi(exponent);
                let capped = base.min(max_delay.as_secs_f64());

                let final_delay = if *jitter {
                    // Add up to 25% jitter
                    capped * (1.0 + rand::thread_rng().gen_range(0.0..0.25))
                } else {
                    capped
                };

                // Out of range for a Duration (huge max_delay, NaN): fall back to the cap.
                Duration::try_from_secs_f64(final_delay.max(0.0))
                    .unwrap_or(*max_delay)
                    .max(*base_delay)
            }
        };

        delay.max(MIN_RETRY_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_bound() {
        let policy = RetryPolicy::new(3, BackoffConfig::fixed(Duration::from_millis(10)));

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));

        let single_try = RetryPolicy::new(0, BackoffConfig::fixed(Duration::from_millis(10)));
        assert!(!single_try.should_retry(0));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::new(5, BackoffConfig::fixed(Duration::from_millis(200)));

        assert_eq!(policy.delay_before_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_before_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_before_attempt(5), Duration::from_millis(200));
    }

    #[test]
    fn test_exponential_delay_calculation() {
        let policy = RetryPolicy::new(
            10,
            BackoffConfig::exponential(Duration::from_secs(1), Duration::from_secs(30)),
        );

        assert_eq!(policy.delay_before_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_before_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_before_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_before_attempt(5), Duration::from_secs(16));
        assert_eq!(policy.delay_before_attempt(6), Duration::from_secs(30)); // Capped
        assert_eq!(policy.delay_before_attempt(40), Duration::from_secs(30)); // Still capped
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(
            10,
            BackoffConfig::Exponential {
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                multiplier: 2.0,
                jitter: true,
            },
        );

        for _ in 0..100 {
            let delay = policy.delay_before_attempt(2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_retry_delays_are_positive() {
        let policies = [
            RetryPolicy::default(),
            RetryPolicy::new(3, BackoffConfig::fixed(Duration::from_millis(1))),
            RetryPolicy::new(
                3,
                BackoffConfig::exponential(Duration::from_millis(1), Duration::from_millis(1)),
            ),
        ];
        for policy in &policies {
            for attempt in 1..=64 {
                assert!(policy.delay_before_attempt(attempt) > Duration::ZERO);
            }
        }
    }

    #[test]
    fn test_zero_delays_are_floored() {
        let fixed = RetryPolicy::new(3, BackoffConfig::fixed(Duration::ZERO));
        assert_eq!(fixed.delay_before_attempt(0), Duration::ZERO);
        assert_eq!(fixed.delay_before_attempt(1), MIN_RETRY_DELAY);

        let exponential = RetryPolicy::new(
            3,
            BackoffConfig::Exponential {
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                multiplier: 2.0,
                jitter: true,
            },
        );
        for attempt in 1..=10 {
            assert_eq!(exponential.delay_before_attempt(attempt), MIN_RETRY_DELAY);
        }
    }

    #[test]
    fn test_unbounded_max_delay_does_not_overflow() {
        for jitter in [false, true] {
            let policy = RetryPolicy::new(
                u32::MAX,
                BackoffConfig::Exponential {
                    base_delay: Duration::from_millis(50),
                    max_delay: Duration::MAX,
                    multiplier: 2.0,
                    jitter,
                },
            );
            assert_eq!(policy.delay_before_attempt(1).as_millis() / 50, 1);
            assert_eq!(policy.delay_before_attempt(200), Duration::MAX);
            assert_eq!(policy.delay_before_attempt(u32::MAX), Duration::MAX);
        }
    }

    #[test]
    fn test_degenerate_multiplier_keeps_base_delay() {
        for multiplier in [f64::NAN, -3.0, 0.0] {
            let policy = RetryPolicy::new(
                5,
                BackoffConfig::Exponential {
                    base_delay: Duration::from_millis(20),
                    max_delay: Duration::from_secs(1),
                    multiplier,
                    jitter: false,
                },
            );
            for attempt in 1..=5 {
                let delay = policy.delay_before_attempt(attempt);
                assert!(delay >= Duration::from_millis(20), "{multiplier}: {delay:?}");
                assert!(delay <= Duration::from_secs(1), "{multiplier}: {delay:?}");
            }
        }
    }
}
