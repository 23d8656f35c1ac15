//! Per-IP rate limiting built on governor's keyed limiters.
//!
//! Two budgets exist: a general one applied to the whole router and a
//! stricter one layered onto the credential endpoints, where brute force
//! attempts concentrate.

use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use serde::Serialize;
use std::{net::IpAddr, net::SocketAddr, num::NonZeroU32, sync::Arc};
use tracing::warn;

pub type KeyedRateLimiter =
    RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub burst: u32,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

impl RateLimitConfig {
    pub fn per_minute(per_minute: u32) -> Self {
        Self {
            per_minute,
            burst: (per_minute / 2).max(1),
            enabled: true,
        }
    }

    /// Tight budget for signin, signup, and OTP endpoints.
    pub fn strict() -> Self {
        Self {
            per_minute: 20,
            burst: 10,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn create_limiter(&self) -> Option<Arc<KeyedRateLimiter>> {
        if !self.enabled {
            return None;
        }

        let rate = NonZeroU32::new(self.per_minute.max(1)).expect("rate is at least one");
        let burst = NonZeroU32::new(self.burst.max(1)).expect("burst is at least one");
        let quota = Quota::per_minute(rate).allow_burst(burst);

        Some(Arc::new(RateLimiter::dashmap(quota)))
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub global_limiter: Option<Arc<KeyedRateLimiter>>,
    pub auth_limiter: Option<Arc<KeyedRateLimiter>>,
    pub config: RateLimitConfig,
}

impl RateLimitState {
    pub fn with_config(global_config: RateLimitConfig, auth_config: RateLimitConfig) -> Self {
        Self {
            global_limiter: global_config.create_limiter(),
            auth_limiter: auth_config.create_limiter(),
            config: global_config,
        }
    }

    pub fn disabled() -> Self {
        Self {
            global_limiter: None,
            auth_limiter: None,
            config: RateLimitConfig::disabled(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RateLimitExceeded {
    pub error: String,
    pub retry_after_secs: u64,
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after_secs.to_string();
        (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("Retry-After", retry_after.clone()),
                ("X-RateLimit-Reset", retry_after),
            ],
            Json(self),
        )
            .into_response()
    }
}

// Requests arriving without connect info (unit tests, misconfigured
// listeners) all share the unspecified-address budget.
fn client_ip(req: &Request) -> IpAddr {
    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip(),
        None => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
    }
}

async fn enforce(
    limiter: &Arc<KeyedRateLimiter>,
    config: &RateLimitConfig,
    exceeded_message: &str,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let ip = client_ip(&request);

    if let Err(not_until) = limiter.check_key(&ip) {
        let wait = not_until.wait_time_from(DefaultClock::default().now());
        let retry_after = wait.as_secs().max(1);

        warn!(ip = %ip, retry_after_secs = retry_after, "Rate limit exceeded");

        return Err(RateLimitExceeded {
            error: exceeded_message.to_string(),
            retry_after_secs: retry_after,
        });
    }

    let mut response = next.run(request).await;
    if let Ok(value) = axum::http::HeaderValue::from_str(&config.per_minute.to_string()) {
        response.headers_mut().insert("X-RateLimit-Limit", value);
    }
    Ok(response)
}

pub async fn rate_limit_middleware(
    rate_limit_state: Option<axum::extract::Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let state = match rate_limit_state {
        Some(axum::extract::Extension(state)) => state,
        None => return Ok(next.run(request).await),
    };

    match &state.global_limiter {
        Some(limiter) => {
            enforce(limiter, &state.config, "Too many requests", request, next).await
        }
        None => Ok(next.run(request).await),
    }
}

pub async fn auth_rate_limit_middleware(
    rate_limit_state: Option<axum::extract::Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let state = match rate_limit_state {
        Some(axum::extract::Extension(state)) => state,
        None => return Ok(next.run(request).await),
    };

    match &state.auth_limiter {
        Some(limiter) => {
            enforce(
                limiter,
                &state.config,
                "Too many authentication attempts",
                request,
                next,
            )
            .await
        }
        None => Ok(next.run(request).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_budget_is_tighter_than_default() {
        let default = RateLimitConfig::default();
        let strict = RateLimitConfig::strict();
        assert!(strict.per_minute < default.per_minute);
        assert!(strict.burst < default.burst);
    }

    #[test]
    fn test_burst_defaults_to_half_the_rate() {
        assert_eq!(RateLimitConfig::per_minute(60).burst, 30);
        assert_eq!(RateLimitConfig::per_minute(1).burst, 1);
    }

    #[test]
    fn test_disabled_config_creates_no_limiter() {
        let config = RateLimitConfig::disabled();
        assert!(!config.enabled);
        assert!(config.create_limiter().is_none());

        let state = RateLimitState::disabled();
        assert!(state.global_limiter.is_none());
        assert!(state.auth_limiter.is_none());
    }

    #[test]
    fn test_with_config_builds_both_limiters() {
        let state =
            RateLimitState::with_config(RateLimitConfig::default(), RateLimitConfig::strict());
        assert!(state.global_limiter.is_some());
        assert!(state.auth_limiter.is_some());
    }

    #[test]
    fn test_exceeded_response_carries_retry_after() {
        let exceeded = RateLimitExceeded {
            error: "Too many requests".to_string(),
            retry_after_secs: 60,
        };
        let response = exceeded.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok()),
            Some("60")
        );
    }

    #[test]
    fn test_budgets_are_tracked_per_ip() {
        let config = RateLimitConfig {
            per_minute: 2,
            burst: 2,
            enabled: true,
        };
        let limiter = config.create_limiter().unwrap();

        let first: IpAddr = "10.0.0.1".parse().unwrap();
        let second: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check_key(&first).is_ok());
        assert!(limiter.check_key(&first).is_ok());
        assert!(limiter.check_key(&first).is_err());

        // Exhausting one key leaves the other's budget intact.
        assert!(limiter.check_key(&second).is_ok());
        assert!(limiter.check_key(&second).is_ok());
        assert!(limiter.check_key(&second).is_err());
    }
}
