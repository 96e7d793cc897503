use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delivery retry and concurrency policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Automatic retries per recipient after the initial send, transient
    /// errors only.
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry.
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay.
    pub max_delay: Duration,
    /// Timeout applied to every gateway call.
    pub gateway_timeout: Duration,
    /// Maximum concurrent sends per dispatch attempt; excess recipients
    /// queue on a semaphore rather than spawning unbounded sends.
    pub max_in_flight: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            gateway_timeout: Duration::from_secs(5),
            max_in_flight: 8,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based): base * 2^(retry-1),
    /// capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(7),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(7));
    }
}
