//! Token bucket rate limiting for price sources.
//!
//! Each registered source gets its own bucket, seeded from the limits the
//! adapter declares. Buckets refill continuously; acquiring waits
//! asynchronously when the bucket is empty.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::adapter::RateLimit;
use crate::models::PriceSource;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
    /// Refill rate in tokens per second.
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    fn from_limit(limit: &RateLimit) -> Self {
        // Burst up to the adapter's concurrency grant. The rate is
        // clamped to at least one request per minute: a zero rate never
        // refills and turns the wait arithmetic into a division by zero.
        let capacity = (limit.max_concurrency as f64).max(1.0);
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: f64::from(limit.requests_per_minute.max(1)) / 60.0,
            capacity,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        }
    }
}

/// Per-source token bucket rate limiter.
pub struct SourceRateLimiter {
    buckets: Mutex<HashMap<PriceSource, TokenBucket>>,
}

impl SourceRateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the buckets, recovering from poison. Worst case after recovery
    /// is slightly off rate accounting, which beats panicking.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<PriceSource, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Register a source with its declared limits, resetting any prior bucket.
    pub fn configure(&self, source: PriceSource, limit: &RateLimit) {
        let mut buckets = self.lock_buckets();
        buckets.insert(source, TokenBucket::from_limit(limit));
    }

    /// Wait until a request token is available for `source`.
    ///
    /// Sources that were never configured are not limited.
    pub async fn acquire(&self, source: PriceSource) {
        loop {
            let wait_time = {
                let mut buckets = self.lock_buckets();
                let Some(bucket) = buckets.get_mut(&source) else {
                    return;
                };
                if bucket.try_acquire() {
                    return;
                }
                bucket.time_until_available()
            };

            if wait_time > Duration::ZERO {
                debug!("rate limiter: waiting {:?} for {}", wait_time, source);
                tokio::time::sleep(wait_time).await;
            }
        }
    }

    /// Try to acquire a token without waiting.
    #[cfg(test)]
    fn try_acquire(&self, source: PriceSource) -> bool {
        let mut buckets = self.lock_buckets();
        match buckets.get_mut(&source) {
            Some(bucket) => bucket.try_acquire(),
            None => true,
        }
    }
}

impl Default for SourceRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
