//! Token-bucket rate limiter for resolver backend calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::core::context::RunContext;
use crate::core::errors::Result;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    max_tokens: f64,
    refill_rate: f64,
}

impl TokenBucket {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    fn try_consume(&mut self, tokens: f64) -> bool {
        self.refill();
        if self.tokens >= tokens {
            self.tokens -= tokens;
            true
        } else {
            false
        }
    }

    fn time_until_available(&self, tokens: f64) -> Duration {
        let missing = (tokens - self.tokens).max(0.0);
        Duration::from_secs_f64(missing / self.refill_rate)
    }
}

/// Rate limiter using the token bucket algorithm.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Create a limiter replenishing `rate` tokens per second with the given
    /// burst capacity.
    pub fn new(rate: u32, burst: u32) -> Self {
        let rate = rate.max(1);
        let burst = burst.max(1);
        Self {
            bucket: Mutex::new(TokenBucket::new(f64::from(burst), f64::from(rate))),
        }
    }

    /// Block until a token is available, under the caller's context.
    pub async fn acquire(&self, ctx: &RunContext) -> Result<()> {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                if bucket.try_consume(1.0) {
                    return Ok(());
                }
                bucket.time_until_available(1.0)
            };
            ctx.sleep(wait).await?;
        }
    }

    /// Consume a token without blocking, if one is available.
    pub async fn try_acquire(&self) -> bool {
        self.bucket.lock().await.try_consume(1.0)
    }
}
