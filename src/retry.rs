use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff with additive jitter.
///
/// The delay before retry `n` (0-indexed) is `base_delay * 2^n` plus a uniform
/// random amount in `[0, jitter]`. `max_retries` retries means at most
/// `max_retries + 1` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "millis")]
    pub base_delay: Duration,
    #[serde(with = "millis")]
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Retries without waiting. Intended for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Exponential part of the delay before retry `retry`.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay_for(retry) + self.jitter.mul_f64(rand::random::<f64>())
    }
}

/// Blocks the calling thread between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_part_doubles() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.base_delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn exponential_part_is_non_decreasing() {
        let policy = RetryPolicy::default();
        for retry in 0..policy.max_retries {
            assert!(policy.base_delay_for(retry + 1) >= policy.base_delay_for(retry));
        }
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            jitter: Duration::from_millis(50),
        };
        for _ in 0..100 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(40));
            assert!(delay <= Duration::from_millis(90));
        }
    }

    #[test]
    fn huge_retry_index_saturates() {
        let policy = RetryPolicy::default();
        assert!(policy.base_delay_for(64) >= policy.base_delay_for(10));
    }

    #[test]
    fn policy_reads_millis_from_json() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_retries":2,"base_delay":250,"jitter":0}"#).unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }
}
