//! Per-client rate limiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::IntoResponse;
use parking_lot::Mutex;

use crate::errors::{AppError, ErrorCode};
use crate::http::middleware::context::ensure_context;
use crate::http::router::Middleware;
use crate::observability::LogField;

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl TokenBucket {
    /// True when refilling up to `now` would leave the bucket full, so
    /// dropping it is the same as starting over.
    fn is_idle(&self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * refill_rate >= capacity
    }
}

/// Buckets keyed by client (user id when authenticated, otherwise address).
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    rps: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(rps: u32, burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rps: f64::from(rps),
            burst: f64::from(burst.max(1)),
        }
    }

    pub fn check(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_acquire(self.burst, self.rps)
    }

    /// Drop buckets that have fully refilled. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_idle(now, self.burst, self.rps));
        before - buckets.len()
    }

    /// Number of tracked clients.
    pub fn tracked(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Guard rejecting over-limit requests with a `TooManyRequests` envelope.
    pub fn middleware(self: Arc<Self>) -> Middleware {
        Middleware::from_fn(move |mut request: Request, next: Next| {
            let limiter = self.clone();
            async move {
                let ctx = ensure_context(&mut request);
                let key = match ctx.identity() {
                    Some(identity) => format!("user:{}", identity.user_id),
                    None => format!(
                        "ip:{}",
                        ctx.request_info().map(|i| i.client_ip).unwrap_or_default()
                    ),
                };

                if limiter.check(&key) {
                    next.run(request).await
                } else {
                    ctx.log_warn("rate limit exceeded", &[LogField::new("client", key)]);
                    AppError::new(ErrorCode::TooManyRequests).into_response()
                }
            }
        })
    }
}
