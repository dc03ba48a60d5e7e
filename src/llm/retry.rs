//! Exponential backoff between attempts on the same candidate.

use std::time::Duration;

use crate::config::ModelConfig;

/// Default base delay for exponential backoff in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default maximum delay for a single backoff sleep in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 16_000;

/// Backoff schedule shared by every call site.
///
/// # Examples
///
/// ```
/// use campus_voice::llm::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth).
    pub max_delay_ms: u64,
    /// Jitter as a fraction of the computed delay (0.0 disables).
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_ratio: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Build the policy from the `[model]` config section.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter_ratio: config.jitter_ratio.clamp(0.0, 1.0),
        }
    }

    /// Set the base delay in milliseconds.
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the maximum delay in milliseconds.
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay after the failed attempt numbered `attempt` (1-based).
    ///
    /// Formula: `min(2^attempt * base, max) + jitter`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt.min(20)).unwrap_or(u64::MAX);
        let delay = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);

        let jitter = if self.jitter_ratio > 0.0 {
            (delay as f64 * self.jitter_ratio * rand::random::<f64>()) as u64
        } else {
            0
        };

        Duration::from_millis(delay.saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(8000));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::default().with_max_delay_ms(5000);
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(5000));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let policy = RetryPolicy {
            jitter_ratio: 0.1,
            ..RetryPolicy::default()
        };
        for _ in 0..32 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(2200));
        }
    }

    #[test]
    fn from_config_clamps_jitter() {
        let config = ModelConfig {
            base_delay_ms: 10,
            jitter_ratio: 4.0,
            ..ModelConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.base_delay_ms, 10);
        assert!((policy.jitter_ratio - 1.0).abs() < f64::EPSILON);
    }
}
