//! Token-bucket rate limiter gating the send loop (spec §4.4).
//!
//! Before registration the bucket is effectively unthrottled
//! (`rate_limit=100`); on `001` the session narrows it to
//! `THROTTLE_RATE=4` lines per `THROTTLE_TIME=2s` (spec §4.1).

use std::time::Duration;

use tokio::time::Instant;

/// A token bucket: `rate_limit` tokens refill continuously over `period`.
#[derive(Debug)]
pub struct Throttle {
    rate_limit: u32,
    period: Duration,
    tokens: f64,
    last_refill: Instant,
}

impl Throttle {
    pub fn new(rate_limit: u32, period: Duration) -> Throttle {
        Throttle {
            rate_limit,
            period,
            tokens: rate_limit as f64,
            last_refill: Instant::now(),
        }
    }

    /// Replace the bucket's rate, preserving whatever fraction of a full
    /// bucket is currently unused.
    pub fn set_rate(&mut self, rate_limit: u32, period: Duration) {
        self.refill();
        let fraction = if self.rate_limit == 0 {
            1.0
        } else {
            self.tokens / self.rate_limit as f64
        };
        self.rate_limit = rate_limit;
        self.period = period;
        self.tokens = fraction * rate_limit as f64;
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = now;
        if self.period.is_zero() || self.rate_limit == 0 {
            return;
        }
        let refilled = elapsed.as_secs_f64() / self.period.as_secs_f64() * self.rate_limit as f64;
        self.tokens = (self.tokens + refilled).min(self.rate_limit as f64);
    }

    /// How long the caller must wait before a token is available, or
    /// `Duration::ZERO` if one already is. Does not consume the token.
    fn wait_duration(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.rate_limit == 0 {
            return Duration::MAX;
        }
        let missing = 1.0 - self.tokens;
        let seconds = missing / self.rate_limit as f64 * self.period.as_secs_f64();
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /// Suspend until a token is available, then consume it.
    pub async fn acquire(&mut self) {
        loop {
            let wait = self.wait_duration();
            if wait.is_zero() {
                self.tokens -= 1.0;
                return;
            }
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn acquire_is_immediate_while_tokens_remain() {
        let mut throttle = Throttle::new(4, Duration::from_secs(2));
        for _ in 0..4 {
            tokio::time::timeout(Duration::from_millis(1), throttle.acquire())
                .await
                .expect("token available immediately");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_blocks_once_bucket_is_empty() {
        let mut throttle = Throttle::new(1, Duration::from_secs(2));
        throttle.acquire().await;
        let blocked = tokio::time::timeout(Duration::from_millis(100), throttle.acquire()).await;
        assert!(blocked.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn set_rate_preserves_fill_fraction() {
        let mut throttle = Throttle::new(100, Duration::from_secs(1));
        throttle.set_rate(4, Duration::from_secs(2));
        for _ in 0..4 {
            tokio::time::timeout(Duration::from_millis(1), throttle.acquire())
                .await
                .expect("full bucket carries over");
        }
    }
}
