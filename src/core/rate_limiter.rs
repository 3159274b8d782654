//! Process-wide admission rate limiter
//!
//! One token bucket shared by every request. The lock covers only the bucket
//! arithmetic, so unrelated request processing is never serialized on it.

use parking_lot::Mutex;
use std::time::Instant;

/// Token bucket state
#[derive(Debug)]
struct TokenBucket {
    /// Current tokens (fractional refill)
    tokens: f64,
    /// Burst capacity
    capacity: f64,
    /// Refill rate in tokens per second
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_sec: u32, burst: u32, now: Instant) -> Self {
        let capacity = burst.max(1) as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: rate_per_sec.max(1) as f64,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        // Instants older than the last refill add nothing
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn retry_after_secs(&mut self, now: Instant) -> u64 {
        self.refill(now);
        let missing = 1.0 - self.tokens;
        if missing <= 0.0 {
            return 0;
        }
        (missing / self.refill_per_sec).ceil() as u64
    }
}

/// Global token-bucket rate limiter
///
/// Admits `rate_per_sec` requests per second on average, with bursts of up
/// to `burst`. Starts full.
#[derive(Debug)]
pub struct GlobalRateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl GlobalRateLimiter {
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(rate_per_sec, burst, Instant::now())),
        }
    }

    /// Take one token, or report that the request must be rejected
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// `try_acquire` against an explicit clock reading
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        self.bucket.lock().try_consume(now)
    }

    /// Seconds until the next token is available (0 if one is available now)
    pub fn retry_after_secs(&self) -> u64 {
        self.bucket.lock().retry_after_secs(Instant::now())
    }
}
