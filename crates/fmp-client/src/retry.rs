//! Bounded-retry policy for transient upstream failures.
//!
//! The delay schedule is a pure function of the attempt number so it can be
//! tested without a clock; a server-provided Retry-After hint overrides the
//! computed backoff.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based: the wait after the
    /// first failed attempt is `delay_for(0, ..)`).
    pub fn delay_for(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint;
        }
        self.base_delay.mul_f64(self.multiplier.powi(attempt as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_is_exponential() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for(0, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(8));
    }

    #[test]
    fn server_hint_overrides_backoff() {
        let policy = RetryPolicy::default();
        let hint = Duration::from_secs(17);
        assert_eq!(policy.delay_for(2, Some(hint)), hint);
    }
}
