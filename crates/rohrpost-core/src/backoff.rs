//! Reconnect backoff.
//!
//! Exponential backoff with full jitter: the base interval doubles on every
//! failure and the actual wait is drawn uniformly from `[0, base)`.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Try again after the given delay.
    Retry {
        /// Base interval this delay was drawn from.
        interval_ms: u64,
        /// Jittered wait.
        delay: Duration,
    },
    /// The interval reached the ceiling; stop trying.
    GiveUp,
}

/// Backoff state for one client.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    config: BackoffConfig,
    /// Current base interval; `0` means no failure since the last reset.
    current_ms: u64,
}

impl BackoffPolicy {
    /// Create a policy with no failures recorded.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current_ms: 0,
        }
    }

    /// Current base interval in milliseconds.
    #[must_use]
    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    /// Record a failure and decide whether to retry.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> BackoffDecision {
        self.current_ms = if self.current_ms == 0 {
            self.config.initial_ms
        } else {
            self.current_ms.saturating_mul(2)
        };

        if self.current_ms >= self.config.ceiling_ms || self.current_ms == 0 {
            return BackoffDecision::GiveUp;
        }

        BackoffDecision::Retry {
            interval_ms: self.current_ms,
            delay: Duration::from_millis(rng.gen_range(0..self.current_ms)),
        }
    }

    /// Forget all failures after a confirmed session.
    pub fn reset(&mut self) {
        self.current_ms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn intervals_until_give_up(policy: &mut BackoffPolicy, rng: &mut StdRng) -> Vec<u64> {
        let mut intervals = Vec::new();
        loop {
            match policy.next(rng) {
                BackoffDecision::Retry { interval_ms, .. } => intervals.push(interval_ms),
                BackoffDecision::GiveUp => return intervals,
            }
        }
    }

    #[test]
    fn test_default_schedule() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut policy = BackoffPolicy::new(BackoffConfig::default());

        let intervals = intervals_until_give_up(&mut policy, &mut rng);
        assert_eq!(intervals, vec![500, 1000, 2000, 4000, 8000, 16000, 32000]);
        assert_eq!(policy.current_ms(), 64_000);
    }

    #[test]
    fn test_delay_is_within_interval() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let mut policy = BackoffPolicy::new(BackoffConfig::default());
            while let BackoffDecision::Retry { interval_ms, delay } = policy.next(&mut rng) {
                assert!(delay < Duration::from_millis(interval_ms));
            }
        }
    }

    #[test]
    fn test_delay_is_spread_across_interval() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut low = 0;
        let mut high = 0;

        for _ in 0..1000 {
            let mut policy = BackoffPolicy::new(BackoffConfig::default());
            if let BackoffDecision::Retry { delay, .. } = policy.next(&mut rng) {
                if delay < Duration::from_millis(250) {
                    low += 1;
                } else {
                    high += 1;
                }
            }
        }

        // Uniform over [0, 500): both halves see plenty of samples.
        assert!(low > 400 && high > 400, "low={low} high={high}");
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut policy = BackoffPolicy::new(BackoffConfig::default());

        policy.next(&mut rng);
        policy.next(&mut rng);
        assert_eq!(policy.current_ms(), 1000);

        policy.reset();
        assert_eq!(policy.current_ms(), 0);
        assert!(matches!(
            policy.next(&mut rng),
            BackoffDecision::Retry {
                interval_ms: 500,
                ..
            }
        ));
    }

    #[test]
    fn test_initial_at_ceiling_gives_up_immediately() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut policy = BackoffPolicy::new(BackoffConfig {
            initial_ms: 1000,
            ceiling_ms: 1000,
        });
        assert_eq!(policy.next(&mut rng), BackoffDecision::GiveUp);
    }
}
