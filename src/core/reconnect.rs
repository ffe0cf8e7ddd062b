use std::time::Duration;

use super::types::WsReconnectStrategy;

/// Bounds for automatic reconnection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

/// Doubling back-off with a fixed attempt budget.
///
/// Attempt `n` (1-based) waits `base * 2^(n-1)`. Once `max_attempts` attempts have been handed
/// out without a successful open in between, `next_delay` returns `None`.
#[derive(Clone, Debug)]
pub struct ExponentialBackoffReconnect {
    base: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl ExponentialBackoffReconnect {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempt: 0,
        }
    }

    pub fn from_policy(policy: ReconnectPolicy) -> Self {
        Self::new(policy.base_delay, policy.max_attempts)
    }

    /// Delay for a given 1-based attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent)
    }
}

impl Default for ExponentialBackoffReconnect {
    fn default() -> Self {
        Self::from_policy(ReconnectPolicy::default())
    }
}

impl WsReconnectStrategy for ExponentialBackoffReconnect {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.delay_for(self.attempt))
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_and_stops_after_five() {
        let mut strategy = ExponentialBackoffReconnect::default();
        let delays: Vec<u64> = std::iter::from_fn(|| strategy.next_delay())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(strategy.attempts(), 5);
        assert!(strategy.next_delay().is_none());
        assert_eq!(strategy.attempts(), 5);
    }

    #[test]
    fn reset_restores_budget() {
        let mut strategy = ExponentialBackoffReconnect::new(Duration::from_millis(10), 2);
        assert_eq!(strategy.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(strategy.next_delay(), Some(Duration::from_millis(20)));
        assert_eq!(strategy.next_delay(), None);

        strategy.reset();
        assert_eq!(strategy.attempts(), 0);
        assert_eq!(strategy.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn zero_budget_never_retries() {
        let mut strategy = ExponentialBackoffReconnect::new(Duration::from_secs(1), 0);
        assert!(strategy.next_delay().is_none());
    }

    #[test]
    fn large_attempts_saturate() {
        let strategy = ExponentialBackoffReconnect::new(Duration::from_secs(1), u32::MAX);
        assert!(strategy.delay_for(64) >= strategy.delay_for(32));
    }
}
