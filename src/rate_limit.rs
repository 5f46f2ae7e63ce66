//! Request pacing and bounded retry for evidence sources
//!
//! Provides a token bucket limiter used to pace search-engine requests and a
//! fixed-delay, bounded retry loop for paginated APIs that answer "not ready
//! yet" while the next page is being prepared.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// A token bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens available in the bucket
    tokens: f64,
    /// Maximum tokens (bucket capacity)
    max_tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    last_update: Instant,
    /// False when the configured rate is 0 (unlimited)
    enabled: bool,
}

impl RateLimiter {
    /// Limiter allowing `requests_per_minute` requests; 0 disables pacing.
    /// Capacity is one token so requests are spread evenly, never burst.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let enabled = requests_per_minute > 0;
        let max_tokens = if enabled { 1.0 } else { f64::INFINITY };

        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate: requests_per_minute as f64 / 60.0,
            last_update: Instant::now(),
            enabled,
        }
    }

    fn refill(&mut self) {
        if !self.enabled {
            return;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_update = now;
    }

    /// Try to take a token, returning how long to wait if none is available
    pub fn try_acquire(&mut self) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let wait_secs = (1.0 - self.tokens) / self.refill_rate;
            Some(Duration::from_secs_f64(wait_secs))
        }
    }

    /// Take a token, sleeping until one is available
    pub async fn acquire(&mut self) {
        while let Some(wait) = self.try_acquire() {
            debug!("Rate limiter waiting {:?} before next request", wait);
            sleep(wait).await;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Cloneable handle to one limiter
#[derive(Debug, Clone)]
pub struct SharedRateLimiter {
    inner: Arc<Mutex<RateLimiter>>,
}

impl SharedRateLimiter {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiter::per_minute(requests_per_minute))),
        }
    }

    pub async fn acquire(&self) {
        let mut limiter = self.inner.lock().await;
        limiter.acquire().await;
    }

    pub async fn is_enabled(&self) -> bool {
        self.inner.lock().await.is_enabled()
    }
}

/// Outcome of one attempt inside [`FixedRetry::run`].
#[derive(Debug)]
pub enum Attempt<T> {
    /// Usable response
    Ready(T),
    /// Upstream not ready yet; retried after the fixed delay
    NotReady(T),
}

/// Bounded retry with a constant delay between attempts. No backoff.
#[derive(Debug, Clone, Copy)]
pub struct FixedRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl FixedRetry {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `operation` until it reports `Ready` or attempts run out.
    /// When attempts are exhausted the last not-ready value is returned as is.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> anyhow::Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<Attempt<T>>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation(attempt).await? {
                Attempt::Ready(value) => return Ok(value),
                Attempt::NotReady(value) => {
                    if attempt >= self.attempts {
                        debug!("Still not ready after {} attempts, giving up on this page", attempt);
                        return Ok(value);
                    }
                    debug!("Attempt {} not ready, retrying in {:?}", attempt, self.delay);
                    sleep(self.delay).await;
                }
            }
        }
    }
}
