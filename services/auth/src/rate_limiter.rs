//! In-process rate limiting for the auth endpoints
//!
//! Fixed windows keyed by client IP (and email for login). State lives in the
//! process, so limits are per instance.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{AppState, error::AuthError};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of requests per window
    pub max_attempts: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl RateLimiterConfig {
    pub const fn new(max_attempts: u32, window_seconds: u64) -> Self {
        Self {
            max_attempts,
            window_seconds,
        }
    }
}

#[derive(Debug)]
struct RateLimiterEntry {
    attempts: u32,
    window_start: Instant,
}

/// Rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    name: &'static str,
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(name: &'static str, config: RateLimiterConfig) -> Self {
        Self {
            name,
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request for `key`; fails with the seconds left in the window when over the limit
    pub async fn check(&self, key: &str) -> Result<(), AuthError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);

        // drop windows that already closed so the map does not grow without bound
        if entries.len() > 10_000 {
            entries.retain(|_, e| now.duration_since(e.window_start) < window);
        }

        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            attempts: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.attempts = 0;
            entry.window_start = now;
        }

        if entry.attempts >= self.config.max_attempts {
            let elapsed = now.duration_since(entry.window_start);
            let retry_after = window.saturating_sub(elapsed).as_secs().max(1);
            warn!("Rate limit '{}' exceeded for {}", self.name, key);
            return Err(AuthError::RateLimited(retry_after));
        }

        entry.attempts += 1;
        Ok(())
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

/// The limiters used by the auth routes
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub general: RateLimiter,
    pub login: RateLimiter,
    pub register: RateLimiter,
    pub otp_verification: RateLimiter,
    pub resend_otp: RateLimiter,
    pub password_reset: RateLimiter,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self {
            general: RateLimiter::new("general", RateLimiterConfig::new(100, 60)),
            login: RateLimiter::new("login", RateLimiterConfig::new(5, 60)),
            register: RateLimiter::new("register", RateLimiterConfig::new(3, 60)),
            otp_verification: RateLimiter::new("otp", RateLimiterConfig::new(10, 15 * 60)),
            resend_otp: RateLimiter::new("resend-otp", RateLimiterConfig::new(3, 60 * 60)),
            password_reset: RateLimiter::new("password-reset", RateLimiterConfig::new(3, 60 * 60)),
        }
    }
}

/// Best-effort client address from proxy headers
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Applies the general per-IP limit to every auth route
pub async fn general_rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let ip = client_ip(req.headers());
    state.rate_limiters.general.check(&ip).await?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new("test", RateLimiterConfig::new(3, 60));

        for _ in 0..3 {
            assert_ok!(limiter.check("1.2.3.4").await);
        }

        match limiter.check("1.2.3.4").await {
            Err(AuthError::RateLimited(retry_after)) => assert!(retry_after >= 1 && retry_after <= 60),
            other => panic!("expected rate limit, got {:?}", other),
        }

        // other keys are independent
        assert_ok!(limiter.check("5.6.7.8").await);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = RateLimiter::new("test", RateLimiterConfig::new(1, 1));

        assert_ok!(limiter.check("k").await);
        assert_err!(limiter.check("k").await);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_ok!(limiter.check("k").await);
    }

    #[test]
    fn test_default_limits() {
        let limiters = RateLimiters::default();
        assert_eq!(limiters.login.config().max_attempts, 5);
        assert_eq!(limiters.register.config().max_attempts, 3);
        assert_eq!(limiters.otp_verification.config().window_seconds, 900);
        assert_eq!(limiters.resend_otp.config().window_seconds, 3600);
        assert_eq!(limiters.general.config().max_attempts, 100);
    }

    #[test]
    fn test_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), "10.0.0.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&headers), "203.0.113.9");
    }
}
