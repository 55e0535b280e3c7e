//! Exponential backoff with jitter for vendor transport retries.

use rand::Rng;
use std::time::Duration;

/// Backoff schedule: 250 ms → 500 ms → 1 s with ±20% jitter by default,
/// capped at three attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub base_ms: u64,
    pub multiplier: f64,
    /// Jitter fraction (0.2 = ±20%).
    pub jitter: f64,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base_ms: 250, multiplier: 2.0, jitter: 0.2, max_attempts: 3 }
    }
}

impl Backoff {
    /// Delay before retrying after `attempt` (1-based) failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_ms as f64 * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let spread = base * self.jitter;
        let jittered = base + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_exponentially_within_jitter() {
        let backoff = Backoff::default();
        for (attempt, base) in [(1u32, 250.0f64), (2, 500.0), (3, 1000.0)] {
            let d = backoff.delay(attempt).as_millis() as f64;
            assert!(d >= base * 0.8 - 1.0, "attempt {attempt}: {d} < lower bound");
            assert!(d <= base * 1.2 + 1.0, "attempt {attempt}: {d} > upper bound");
        }
    }

    #[test]
    fn three_attempts_by_default() {
        let backoff = Backoff::default();
        assert!(!backoff.exhausted(2));
        assert!(backoff.exhausted(3));
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let backoff = Backoff { jitter: 0.0, ..Default::default() };
        assert_eq!(backoff.delay(1), Duration::from_millis(250));
        assert_eq!(backoff.delay(2), Duration::from_millis(500));
    }
}
