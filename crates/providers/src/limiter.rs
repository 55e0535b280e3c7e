//! Per-vendor token-bucket rate limiting.
//!
//! Buckets are process-wide and shared across sessions. Waiting is an
//! async suspension; sessions cancel by dropping the acquire future, so
//! no cancellation token threads through here.

use std::time::Instant;
use tokio::sync::Mutex;

/// A token bucket: `capacity` requests burst, refilled at
/// `refill_per_sec`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    available: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            state: Mutex::new(BucketState {
                available: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, waiting for refill if none is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.available =
                    (state.available + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();

                if state.available >= 1.0 {
                    state.available -= 1.0;
                    return;
                }
                (1.0 - state.available) / self.refill_per_sec
            };
            tokio::time::sleep(std::time::Duration::from_secs_f64(wait)).await;
        }
    }

    /// Non-blocking variant for tests and health checks.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.available = (state.available + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();
        if state.available >= 1.0 {
            state.available -= 1.0;
            true
        } else {
            false
        }
    }
}
