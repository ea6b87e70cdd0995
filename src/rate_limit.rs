//! Token-bucket rate limiter shared by every outbound vault call.
//!
//! Tokens refill continuously at `refill_rate` per second up to `capacity`.
//! Refill is computed lazily from the elapsed time whenever the bucket is
//! touched, so no background timer is needed.
//!
//! Two locks are involved:
//!
//! - a fair [`tokio::sync::Mutex`] turnstile that queues waiting callers in
//!   FIFO order, so every caller eventually gets its token;
//! - a short-lived [`std::sync::Mutex`] around the bucket arithmetic, never
//!   held across an `.await`.
//!
//! Time comes from [`tokio::time::Instant`] so tests can run against a
//! paused clock.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Snapshot of the bucket's accounting state.
#[derive(Debug, Clone)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is projected to arrive.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(needed / self.refill_rate))
        }
    }
}

/// Process-wide request gate. Share it behind an `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    turnstile: tokio::sync::Mutex<()>,
}

impl RateLimiter {
    /// Create a full bucket.
    ///
    /// `capacity` is clamped to at least 1 and `refill_rate` to a small
    /// positive value so `acquire` can always make progress.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = capacity.max(1) as f64;
        let refill_rate = if refill_rate > 0.0 { refill_rate } else { 1e-3 };
        Self {
            bucket: Mutex::new(Bucket {
                capacity,
                tokens: capacity,
                refill_rate,
                last_refill: Instant::now(),
            }),
            turnstile: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.refill_per_sec)
    }

    /// Wait until a token is available, then consume it.
    ///
    /// Cancel-safe: dropping the future before it resolves consumes nothing.
    pub async fn acquire(&self) {
        let _turn = self.turnstile.lock().await;
        loop {
            let wait = match self.lock_bucket().try_take(Instant::now()) {
                Ok(()) => return,
                Err(wait) => wait,
            };
            tracing::trace!(wait_ms = wait.as_millis() as u64, "rate limit: waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available (after lazy refill).
    pub fn available(&self) -> f64 {
        let mut bucket = self.lock_bucket();
        bucket.refill(Instant::now());
        bucket.tokens
    }

    fn lock_bucket(&self) -> std::sync::MutexGuard<'_, Bucket> {
        // The bucket holds plain numbers; a panic elsewhere cannot leave it
        // half-updated, so a poisoned lock is still usable.
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }
}
