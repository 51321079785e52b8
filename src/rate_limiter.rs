use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Clone, Debug, Default)]
pub struct Limits {
    pub requests_per_min: Option<u64>,
    /// Requests that may go out back-to-back before pacing kicks in. Defaults to 1.
    pub burst: Option<u64>,
}

impl Limits {
    pub fn per_minute(requests_per_min: u64) -> Self {
        Self {
            requests_per_min: Some(requests_per_min),
            ..Default::default()
        }
    }

    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = Some(burst);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    limits: Limits,
    // token bucket modeled by the current tokens and the time of last refill
    rpm_tokens: Mutex<(f64, Instant)>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        let burst = limits.burst.unwrap_or(1).max(1) as f64;
        Self {
            inner: Arc::new(Inner {
                limits,
                rpm_tokens: Mutex::new((burst, Instant::now())),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Limits::default())
    }

    /// Wait for a request slot.
    pub async fn acquire(&self) {
        if let Some(rpm) = self.inner.limits.requests_per_min {
            if rpm > 0 {
                self.consume_token(rpm as f64).await;
            }
        }
    }

    async fn consume_token(&self, per_minute: f64) {
        let capacity = self.inner.limits.burst.unwrap_or(1).max(1) as f64;
        let refill_rate = per_minute / 60.0; // tokens per second
        loop {
            let mut guard = self.inner.rpm_tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *tokens = (*tokens + elapsed * refill_rate).min(capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                break;
            }
            let secs = (1.0 - *tokens) / refill_rate;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(secs.max(0.001))).await;
        }
    }
}
