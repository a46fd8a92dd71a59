//! 🔄 Retry policy: how many times do we knock before we go home?
//!
//! A policy is a name (`fixed`, `linear`, `exponential`), an attempt ceiling, and a base delay.
//! It produces a finite sequence of delays: one per retry, so `max_attempts - 1` of them.
//! The bulk client pulls the next delay after each transient failure, sleeps it off,
//! and tries again. When the sequence runs dry, the batch is declared undeliverable.
//!
//! ```text
//! fixed:        d, d, d, d ...
//! linear:       d, 2d, 3d, 4d ...
//! exponential:  d, 2d, 4d, 8d ...      (all capped at max_delay)
//! ```
//!
//! No config, no retries: a client without a `retry` block gets exactly one attempt.

use std::str::FromStr;
use std::time::Duration;

use crate::error::BulkError;

/// 🏷️ The shape of the backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicyKind {
    Fixed,
    Linear,
    Exponential,
}

impl FromStr for RetryPolicyKind {
    type Err = BulkError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(RetryPolicyKind::Fixed),
            "linear" => Ok(RetryPolicyKind::Linear),
            "exponential" => Ok(RetryPolicyKind::Exponential),
            other => Err(BulkError::InvalidConfig {
                key: "retry.policy",
                reason: format!(
                    "unknown policy '{}', expected one of fixed, linear, exponential",
                    other
                ),
            }),
        }
    }
}

/// 🔄 A resolved retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    kind: RetryPolicyKind,
    max_attempts: u32,
    delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// 🔢 Attempt ceiling when a `retry` block is present but says nothing about attempts.
    pub const DEFAULT_ATTEMPTS: u32 = 20;
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

    /// 🏗️ A policy with the given shape and ceiling. `max_attempts` of 0 is bumped to 1:
    /// the first try is not optional.
    pub fn new(kind: RetryPolicyKind, max_attempts: u32, delay: Duration, max_delay: Duration) -> Self {
        Self {
            kind,
            max_attempts: max_attempts.max(1),
            delay,
            max_delay: max_delay.max(delay),
        }
    }

    /// 🚫 One attempt, no retries. The default for clients without a `retry` block.
    pub fn no_retry() -> Self {
        Self::new(RetryPolicyKind::Fixed, 1, Duration::ZERO, Duration::ZERO)
    }

    pub fn kind(&self) -> RetryPolicyKind {
        self.kind
    }

    /// 🔢 Total tries, first attempt included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// ⏱️ Delay to wait before retry number `retry` (1-based: the first retry is 1).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let scaled = match self.kind {
            RetryPolicyKind::Fixed => self.delay,
            RetryPolicyKind::Linear => self.delay.saturating_mul(retry),
            RetryPolicyKind::Exponential => {
                // -- 📈 2^(retry-1), clamped so the shift can't wrap around into tiny delays
                let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor)
            }
        };
        scaled.min(self.max_delay)
    }

    /// 🎟️ The delay sequence: one permission slip per allowed retry.
    pub fn delays(&self) -> RetryDelays<'_> {
        RetryDelays {
            policy: self,
            next_retry: 1,
        }
    }
}

/// 🎟️ Iterator over the delays of a [`RetryPolicy`]. Yields `max_attempts - 1` items.
#[derive(Debug)]
pub struct RetryDelays<'a> {
    policy: &'a RetryPolicy,
    next_retry: u32,
}

impl Iterator for RetryDelays<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next_retry >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_for(self.next_retry);
        self.next_retry += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn the_one_where_each_curve_has_its_own_personality() {
        let fixed = RetryPolicy::new(RetryPolicyKind::Fixed, 4, ms(100), ms(10_000));
        let linear = RetryPolicy::new(RetryPolicyKind::Linear, 4, ms(100), ms(10_000));
        let exponential = RetryPolicy::new(RetryPolicyKind::Exponential, 4, ms(100), ms(10_000));

        assert_eq!(fixed.delays().collect::<Vec<_>>(), vec![ms(100), ms(100), ms(100)]);
        assert_eq!(linear.delays().collect::<Vec<_>>(), vec![ms(100), ms(200), ms(300)]);
        assert_eq!(
            exponential.delays().collect::<Vec<_>>(),
            vec![ms(100), ms(200), ms(400)]
        );
    }

    #[test]
    fn the_one_where_the_cap_keeps_exponential_honest() {
        let policy = RetryPolicy::new(RetryPolicyKind::Exponential, 40, ms(100), ms(1_000));
        assert_eq!(policy.delay_for(35), ms(1_000));
        assert!(policy.delays().all(|d| d <= ms(1_000)));
    }

    #[test]
    fn the_one_where_no_retry_means_no_delays() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delays().count(), 0);
    }

    #[test]
    fn the_one_where_zero_attempts_still_means_one_try() {
        let policy = RetryPolicy::new(RetryPolicyKind::Linear, 0, ms(1), ms(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn the_one_where_policy_names_are_case_insensitive_but_not_imaginative() {
        assert_eq!("Linear".parse::<RetryPolicyKind>().ok(), Some(RetryPolicyKind::Linear));
        assert!(matches!(
            "fibonacci".parse::<RetryPolicyKind>(),
            Err(BulkError::InvalidConfig { key: "retry.policy", .. })
        ));
    }
}
