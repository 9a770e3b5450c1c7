//! Reconnection policy for the streaming connection.
//!
//! Retries are unbounded. The default configuration waits a fixed two
//! seconds between attempts; a multiplier above 1.0 grows the delay up to
//! `max_delay`.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Ceiling for the delay between attempts.
    pub max_delay: Duration,
    /// Growth factor applied after each failed attempt (1.0 = fixed delay).
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(2),
            multiplier: 1.0,
        }
    }
}

impl ReconnectConfig {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }
}

#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u64,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay.min(config.max_delay);
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt. There is no attempt ceiling.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count += 1;
        let delay = self.current_delay;

        let scaled = (self.current_delay.as_nanos() as f64 * self.config.multiplier.max(1.0)).round();
        let next = if scaled.is_finite() && scaled < u64::MAX as f64 {
            Duration::from_nanos(scaled as u64)
        } else {
            self.config.max_delay
        };
        self.current_delay = next.min(self.config.max_delay);

        delay
    }

    /// Called once a connection is established.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay.min(self.config.max_delay);
        self.attempt_count = 0;
    }

    pub fn attempt_count(&self) -> u64 {
        self.attempt_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fixed_two_seconds_forever() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        for _ in 0..1_000 {
            assert_eq!(policy.next_delay(), Duration::from_secs(2));
        }
        assert_eq!(policy.attempt_count(), 1_000);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
        });
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
        assert_eq!(policy.next_delay(), Duration::from_millis(200));
        assert_eq!(policy.next_delay(), Duration::from_millis(350));
        assert_eq!(policy.next_delay(), Duration::from_millis(350));
    }

    #[test]
    fn test_reset_restores_initial_delay() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 3.0,
        });
        policy.next_delay();
        policy.next_delay();
        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_multiplier_below_one_does_not_shrink() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
            multiplier: 0.5,
        });
        policy.next_delay();
        assert_eq!(policy.next_delay(), Duration::from_millis(500));
    }
}
