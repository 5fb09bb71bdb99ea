use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use pressroom_common::config::RateLimitConfig;

/// Process-wide token bucket shared by every generation and translation call.
///
/// `capacity` bounds bursts; `refill_per_second` bounds the sustained rate.
/// Over any interval of length `t` at most `capacity + refill_per_second * t`
/// calls get through. Callers that find the bucket empty sleep; nothing is
/// ever rejected.
pub struct RateLimiter {
    capacity: f64,
    refill_per_second: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_second: refill_per_second.max(f64::MIN_POSITIVE),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.refill_per_second)
    }

    /// Take one token, sleeping until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.try_take() {
                Ok(()) => return,
                Err(wait) => wait,
            };
            debug!(wait_ms = wait.as_millis() as u64, "Rate limiter empty, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Take one token if available, otherwise report how long until one is.
    pub fn try_take(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_second))
        }
    }

    /// Whole tokens currently available.
    pub fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut bucket);
        bucket.tokens.floor() as u32
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_second).min(self.capacity);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_capacity_is_immediate() {
        let limiter = RateLimiter::new(3, 1.0);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bucket_reports_wait_for_next_token() {
        let limiter = RateLimiter::new(1, 2.0);
        assert!(limiter.try_take().is_ok());
        let wait = limiter.try_take().unwrap_err();
        assert_eq!(wait, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new(2, 10.0);
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.available(), 2);
    }
}
