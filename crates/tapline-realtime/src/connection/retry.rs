//! Bounded, fixed-delay reconnection policy.

use std::time::Duration;

use tapline_core::config::RealtimeConfig;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up until a manual retry.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub delay: Duration,
    /// Timeout of a single attempt.
    pub connect_timeout: Duration,
}

impl RetryPolicy {
    /// Policy described by the realtime configuration section.
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Whether `attempts` consecutive failures spend the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        let policy = RetryPolicy::from_config(&RealtimeConfig::default());
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert_eq!(policy.delay, Duration::from_millis(2000));
    }
}
