//! Fixed-window rate limiting per client IP.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::time::MissedTickBehavior;

use crate::config::RateLimitConfig;
use crate::http::error::error_response;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// Counting state of one client.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32, reset_after: Duration },
    Limited { retry_after: Duration },
}

/// Per-client request counters over fixed windows.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    window: Duration,
    max: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
            max,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs), config.max_requests)
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        // A panic while holding the lock cannot leave a window half-updated.
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Count one request from `key` at `now`. Rejected requests are not counted.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut windows = self.lock();
        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        let mut elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
            elapsed = Duration::ZERO;
        }

        let reset_after = self.window - elapsed;
        if entry.count >= self.max {
            return Decision::Limited {
                retry_after: reset_after,
            };
        }

        entry.count += 1;
        Decision::Allowed {
            remaining: self.max - entry.count,
            reset_after,
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drop windows that have fully elapsed at `now`. Returns how many were dropped.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - windows.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Periodically evict expired windows until shutdown.
    pub async fn run_sweeper(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), Infallible> {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep();
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = self.tracked_clients(), "Expired rate windows evicted");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate window sweeper stopped");
                    return Ok(());
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub enabled: bool,
    pub limiter: Arc<RateLimiter>,
}

fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: u64) {
    headers.insert(name, HeaderValue::from(value));
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

pub async fn rate_limit(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(req).await;
    }

    let key = client_key(&req);
    let limit = u64::from(state.limiter.max());

    match state.limiter.check(&key) {
        Decision::Allowed {
            remaining,
            reset_after,
        } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            set_header(headers, "ratelimit-limit", limit);
            set_header(headers, "ratelimit-remaining", u64::from(remaining));
            set_header(headers, "ratelimit-reset", ceil_secs(reset_after));
            response
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(client = %key, path = %req.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limited();

            let mut response = error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, please try again later.",
            );
            let headers = response.headers_mut();
            let retry = ceil_secs(retry_after);
            set_header(headers, "retry-after", retry);
            set_header(headers, "ratelimit-limit", limit);
            set_header(headers, "ratelimit-remaining", 0);
            set_header(headers, "ratelimit-reset", retry);
            response
        }
    }
}
