//! Per-client token bucket rate limiting.
//!
//! Each client IP owns a bucket holding up to `burst` tokens, refilled at
//! `rps` tokens per second. A request spends one token; an empty bucket means
//! 429. Buckets idle for longer than [`IDLE_EXPIRY`] are swept periodically.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::errors::ApiError;
use crate::config::LimiterConfig;
use crate::logging::log_security_event;
use crate::metrics;

/// How often idle buckets are swept
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Buckets unused for this long are dropped
pub const IDLE_EXPIRY: Duration = Duration::from_secs(180);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Bucket size
    pub limit: u32,
    /// Whole tokens left after this request
    pub remaining: u32,
    /// Unix seconds after which the client may retry
    pub reset: u64,
}

/// Token buckets keyed by client IP
#[derive(Debug)]
pub struct RateLimiter {
    rps: f64,
    burst: u32,
    enabled: bool,
    clients: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Example
    ///
    /// ```
    /// use tt_server::api::rate_limiter::RateLimiter;
    /// use tt_server::config::LimiterConfig;
    ///
    /// let limiter = RateLimiter::new(LimiterConfig { rps: 2.0, burst: 4, enabled: true });
    /// for _ in 0..4 {
    ///     assert!(limiter.allow("10.0.0.1").allowed);
    /// }
    /// assert!(!limiter.allow("10.0.0.1").allowed);
    /// ```
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            rps: config.rps,
            burst: config.burst,
            enabled: config.enabled,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check and charge one request for `ip`
    pub fn allow(&self, ip: &str) -> RateLimitDecision {
        self.allow_at(ip, Instant::now())
    }

    /// [`allow`](Self::allow) at an explicit instant.
    pub fn allow_at(&self, ip: &str, now: Instant) -> RateLimitDecision {
        let burst = f64::from(self.burst);
        let mut clients = self.lock();
        let bucket = clients.entry(ip.to_string()).or_insert_with(|| Bucket {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.rps).min(burst);
        bucket.last_refill = now;
        bucket.last_seen = now;

        let allowed = bucket.tokens >= 1.0;
        if allowed {
            bucket.tokens -= 1.0;
        }

        RateLimitDecision {
            allowed,
            limit: self.burst,
            remaining: bucket.tokens.floor().max(0.0) as u32,
            reset: (chrono::Utc::now().timestamp() + 1).max(0) as u64,
        }
    }

    /// Drop buckets not seen for [`IDLE_EXPIRY`]. Returns how many remain.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        clients.retain(|_, b| now.saturating_duration_since(b.last_seen) <= IDLE_EXPIRY);
        clients.len()
    }

    /// Number of tracked clients
    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    /// Sweep every [`SWEEP_INTERVAL`] until the runtime shuts down.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let remaining = limiter.sweep(Instant::now());
                metrics::rate_limit_clients(remaining);
                tracing::debug!(clients = remaining, "rate limiter sweep");
            }
        })
    }
}

/// Client address: first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: u64) {
    if let Ok(v) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, v);
    }
}

/// Middleware charging each request against its client's bucket.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.enabled() {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let ip = client_ip(request.headers(), peer);
    let decision = limiter.allow(&ip);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        metrics::rate_limit_exceeded();
        log_security_event("rate_limited", None, Some(&ip), "rate limit exceeded");
        ApiError::RateLimitExceeded.into_response()
    };

    let headers = response.headers_mut();
    set_header(headers, "x-ratelimit-limit", u64::from(decision.limit));
    set_header(headers, "x-ratelimit-remaining", u64::from(decision.remaining));
    set_header(headers, "x-ratelimit-reset", decision.reset);
    response
}
