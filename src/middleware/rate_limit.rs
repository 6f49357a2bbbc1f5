use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::response::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started: Instant,
}

/// Fixed-window request counter keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    window_secs: u64,
    max_requests: u64,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds at which the current window closes.
    pub reset_at: u64,
}

impl RateLimiter {
    pub fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            window_secs: window_secs.max(1),
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(ip).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(window.started).as_secs() >= self.window_secs {
            *window = Window {
                count: 0,
                started: now,
            };
        }

        let allowed = window.count < self.max_requests;
        if allowed {
            window.count += 1;
        }

        let elapsed = now.duration_since(window.started).as_secs();
        let unix_now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(window.count),
            reset_at: unix_now + self.window_secs.saturating_sub(elapsed),
        }
    }

    /// Forget clients whose window closed; returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started).as_secs() < self.window_secs);
        before - windows.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.len()
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if !req.uri().path().starts_with("/api/") {
        return next.run(req).await;
    }

    let ip = extract_client_ip(req.headers(), state.config().trust_proxy);
    let decision = state.rate_limiter().check(ip).await;

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        tracing::warn!(%ip, "Rate limit exceeded");
        let mut response = AppError::too_many_requests("Too many requests").into_response();
        set_header(
            &mut response,
            "retry-after",
            state.rate_limiter().window_secs(),
        );
        response
    };

    set_header(&mut response, "ratelimit-limit", decision.limit);
    set_header(&mut response, "ratelimit-remaining", decision.remaining);
    set_header(&mut response, "ratelimit-reset", decision.reset_at);
    response
}

fn set_header(response: &mut Response, name: &'static str, value: u64) {
    if let Ok(v) = HeaderValue::from_str(&value.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(name), v);
    }
}

/// Client address from proxy headers; `x-forwarded-for` only counts behind a trusted proxy.
pub fn extract_client_ip(headers: &HeaderMap, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
