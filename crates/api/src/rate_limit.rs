//! Per-client request rate limiting.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Over budget; the oldest counted request leaves the window after
    /// `retry_after`.
    Limited { retry_after: Duration },
}

/// Decides whether a client may make another request.
pub trait RateLimiter: Send + Sync {
    fn check(&self, key: &str) -> RateDecision;
}

/// Map size above which idle clients are swept on the next check.
const SWEEP_THRESHOLD: usize = 10_000;

/// Sliding-window limiter: at most `max_requests` per `window` per key.
///
/// Rejected requests are not counted against the window.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Checks `key` as of `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        let window = self.window;
        let expired = |at: &Instant| now.saturating_duration_since(*at) >= window;

        if hits.len() > SWEEP_THRESHOLD {
            hits.retain(|_, stamps| stamps.back().is_some_and(|last| !expired(last)));
        }

        let stamps = hits.entry(key.to_string()).or_default();
        while stamps.front().is_some_and(expired) {
            stamps.pop_front();
        }

        if stamps.len() >= self.max_requests {
            let retry_after = stamps
                .front()
                .map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(window);
            return RateDecision::Limited { retry_after };
        }

        stamps.push_back(now);
        RateDecision::Allowed
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }
}

/// Identifies the client: first `X-Forwarded-For` hop, else the peer
/// address, else `"unknown"`.
pub fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        && let Some(first) = forwarded.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return first.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware rejecting over-budget clients with 429.
pub async fn enforce(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    match limiter.check(&key) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            metrics::counter!("rate_limited_requests_total").increment(1);
            tracing::warn!(client = %key, "rate limit exceeded");
            // Round up so clients never retry early.
            let retry_after_secs =
                retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            ApiError::RateLimited { retry_after_secs }.into_response()
        }
    }
}
