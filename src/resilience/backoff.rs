//! Exponential backoff with jitter
//!
//! Maps a 1-based attempt number to a wait duration:
//! `min(base * multiplier^(attempt-1), max_delay) + jitter`, with jitter
//! drawn uniformly from `[0, jitter_ratio * delay]`.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Backoff strategy for retry delays
#[derive(Debug, Clone)]
pub struct BackoffStrategy {
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter_ratio: f64,
}

impl BackoffStrategy {
    /// Create a strategy from explicit parameters
    pub fn new(base: Duration, max: Duration, multiplier: f64, jitter_ratio: f64) -> Self {
        Self {
            base,
            max,
            multiplier,
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
        }
    }

    /// Create a strategy from retry configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.backoff_multiplier,
            config.jitter_ratio,
        )
    }

    /// Delay before the retry following `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.max.as_secs_f64());

        let jitter = if self.jitter_ratio > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter_ratio) * capped
        } else {
            0.0
        };

        Duration::from_secs_f64(capped + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without_jitter(base_ms: u64, max_ms: u64, multiplier: f64) -> BackoffStrategy {
        BackoffStrategy::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            multiplier,
            0.0,
        )
    }

    // Test 1: Exponential growth without jitter
    #[test]
    fn test_exponential_growth() {
        let backoff = without_jitter(500, 300_000, 2.0);

        // Attempt 1: 500 * 2^0 = 500ms
        assert_eq!(backoff.delay(1), Duration::from_millis(500));

        // Attempt 2: 500 * 2^1 = 1000ms
        assert_eq!(backoff.delay(2), Duration::from_millis(1000));

        // Attempt 3: 500 * 2^2 = 2000ms
        assert_eq!(backoff.delay(3), Duration::from_millis(2000));

        // Attempt 4: 500 * 2^3 = 4000ms
        assert_eq!(backoff.delay(4), Duration::from_millis(4000));
    }

    // Test 2: Delay is capped at max_delay
    #[test]
    fn test_capped_at_max() {
        let backoff = without_jitter(1000, 8000, 2.0);

        // Attempt 5: 1000 * 2^4 = 16000ms, capped at 8000ms
        assert_eq!(backoff.delay(5), Duration::from_millis(8000));

        // Much later attempts stay capped
        assert_eq!(backoff.delay(30), Duration::from_millis(8000));
    }

    // Test 3: Jitter stays within the configured ratio
    #[test]
    fn test_jitter_within_ratio() {
        let backoff = BackoffStrategy::new(
            Duration::from_millis(1000),
            Duration::from_millis(300_000),
            2.0,
            0.25,
        );

        for _ in 0..100 {
            let delay = backoff.delay(1);
            // Base 1000ms plus at most 25% jitter
            assert!(
                delay >= Duration::from_millis(1000) && delay <= Duration::from_millis(1250),
                "Delay {:?} outside expected jitter range",
                delay
            );
        }
    }

    // Test 4: Out-of-range jitter ratio is clamped
    #[test]
    fn test_jitter_ratio_clamped() {
        let backoff = BackoffStrategy::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            2.0,
            5.0,
        );

        for _ in 0..50 {
            let delay = backoff.delay(1);
            // Clamped to ratio 1.0: at most double the base
            assert!(delay <= Duration::from_millis(200));
        }
    }

    // Test 5: From-config construction uses configured values
    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            base_delay_ms: 250,
            max_delay_ms: 10_000,
            backoff_multiplier: 3.0,
            jitter_ratio: 0.0,
            ..RetryConfig::default()
        };
        let backoff = BackoffStrategy::from_config(&config);

        assert_eq!(backoff.delay(1), Duration::from_millis(250));
        assert_eq!(backoff.delay(2), Duration::from_millis(750));
        assert_eq!(backoff.delay(3), Duration::from_millis(2250));
    }

    // Test 6: Very large attempt numbers do not overflow
    #[test]
    fn test_large_attempt_no_overflow() {
        let backoff = without_jitter(1000, 60_000, 2.0);
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(60_000));
    }
}
