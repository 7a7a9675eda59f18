//! Per-publisher token bucket for the ad-hoc chat endpoint.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;

use askpage_common::ids::PublisherId;

/// Rate limiter for `/qa/ask`, keyed by publisher. Non-blocking: a caller
/// without a token gets an immediate rejection.
pub struct QaRateLimiter {
    buckets: Mutex<HashMap<PublisherId, TokenBucket>>,
    rate_per_second: f64,
    capacity: f64,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl QaRateLimiter {
    /// `rate_per_minute` is both the sustained rate and the burst capacity.
    pub fn new(rate_per_minute: u32) -> Self {
        let capacity = f64::from(rate_per_minute.max(1));
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate_per_second: capacity / 60.0,
            capacity,
        }
    }

    /// Take one token for the publisher if available.
    pub async fn try_acquire(&self, publisher_id: PublisherId) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(publisher_id).or_insert_with(|| TokenBucket {
            tokens: self.capacity,
            last_refill: Instant::now(),
        });

        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_second).min(self.capacity);
        bucket.last_refill = Instant::now();

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_rejection() {
        let limiter = QaRateLimiter::new(3);
        let publisher = PublisherId::new();

        assert!(limiter.try_acquire(publisher).await);
        assert!(limiter.try_acquire(publisher).await);
        assert!(limiter.try_acquire(publisher).await);
        assert!(!limiter.try_acquire(publisher).await);
    }

    #[tokio::test]
    async fn test_buckets_are_per_publisher() {
        let limiter = QaRateLimiter::new(1);
        let a = PublisherId::new();
        let b = PublisherId::new();

        assert!(limiter.try_acquire(a).await);
        assert!(!limiter.try_acquire(a).await);
        assert!(limiter.try_acquire(b).await);
    }
}
