//! Exponential backoff with jitter for transient submission failures.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff schedule between filing attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Transient failures tolerated before the case fails
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Delay multiplier per retry
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Delay ceiling, in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Jitter as a fraction of the computed delay (0.2 = plus/minus 20%)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay() -> u64 {
    3_600_000
} // 1 hour
fn default_jitter() -> f64 {
    0.2
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry_count` (1-indexed), jittered
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31) as i32;
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);

        let jittered = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(jittered as u64)
    }

    /// Wall-clock time before which the next attempt must not run
    pub fn next_attempt_at(&self, now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.delay_for(retry_count))
            .unwrap_or_else(|_| chrono::Duration::milliseconds(self.max_delay_ms as i64))
    }

    /// Whether the retry budget is spent
    pub fn exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_without_jitter() -> BackoffPolicy {
        BackoffPolicy {
            max_retries: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_delays_grow_exponentially() {
        let p = policy_without_jitter();
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(2000));
        assert_eq!(p.delay_for(3), Duration::from_millis(4000));
        assert_eq!(p.delay_for(4), Duration::from_millis(8000));
    }

    #[test]
    fn test_delay_is_capped() {
        let p = policy_without_jitter();
        assert_eq!(p.delay_for(10), Duration::from_millis(10_000));
        assert_eq!(p.delay_for(100), Duration::from_millis(10_000));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let p = BackoffPolicy {
            jitter: 0.2,
            ..policy_without_jitter()
        };
        for _ in 0..50 {
            let d = p.delay_for(2).as_millis() as f64;
            assert!((1600.0..=2400.0).contains(&d), "delay {} out of band", d);
        }
    }

    #[test]
    fn test_exhaustion() {
        let p = policy_without_jitter();
        assert!(!p.exhausted(0));
        assert!(!p.exhausted(2));
        assert!(p.exhausted(3));
        assert!(p.exhausted(4));
    }

    #[test]
    fn test_serde_defaults() {
        let p: BackoffPolicy = serde_yaml::from_str("max_retries: 5").unwrap();
        assert_eq!(p.max_retries, 5);
        assert_eq!(p.base_delay_ms, 30_000);
        assert_eq!(p.multiplier, 2.0);
    }
}
