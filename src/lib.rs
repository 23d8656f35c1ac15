//! Hireline - Job board backend with company hiring workflows and realtime chat.

pub mod auth;
pub mod authz;
pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod helpers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod realtime;
pub mod schema;
pub mod telemetry;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::jwt::JwtConfig;
use auth::lockout::LockoutManager;
use auth::password::PasswordPolicy;
use cache::{create_redis_pool, CacheServices};
use chat::ChatService;
use middleware::{
    metrics::metrics_middleware,
    rate_limit::{
        auth_rate_limit_middleware, rate_limit_middleware, RateLimitConfig, RateLimitState,
    },
    request_id::request_id_middleware,
};
use realtime::{ConnectionRegistry, RealtimeGateway};
use telemetry::MetricsState;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub rate_limit: RateLimitState,
    pub jwt_config: Arc<JwtConfig>,
    pub cache: CacheServices,
    pub lockout: Arc<LockoutManager>,
    pub password_policy: PasswordPolicy,
    pub rotate_refresh_tokens: bool,
    pub otp_expiry_mins: i64,
    pub metrics: MetricsState,
    pub registry: Arc<ConnectionRegistry>,
    pub gateway: RealtimeGateway,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(db_pool: DbPool, redis_pool: Option<deadpool_redis::Pool>, config: &Config) -> Self {
        let rate_limit = if config.security.rate_limiting_enabled {
            RateLimitState::with_config(
                RateLimitConfig::per_minute(config.security.rate_limit_requests_per_minute),
                RateLimitConfig::strict(),
            )
        } else {
            RateLimitState::disabled()
        };

        let jwt_config = JwtConfig::from_env_with_expiry(
            config.jwt.access_token_expiry_secs,
            config.jwt.refresh_token_expiry_secs,
            config.jwt.issuer.clone(),
            config.jwt.audience.clone(),
        );

        let redis_pool = redis_pool.or_else(|| create_redis_pool(&config.redis));
        let cache = CacheServices::new(redis_pool.clone());
        let lockout = LockoutManager::new(
            redis_pool,
            config.security.max_failed_login_attempts,
            config.security.lockout_duration_mins,
        );

        let password_policy = if config.security.require_password_complexity {
            PasswordPolicy::complex(config.security.min_password_length)
        } else {
            PasswordPolicy {
                min_length: config.security.min_password_length,
                ..Default::default()
            }
        };

        let metrics = MetricsState::new(config.telemetry.metrics_enabled);

        let registry = Arc::new(ConnectionRegistry::new());
        let gateway = RealtimeGateway::new(registry.clone());
        let chat = ChatService::new(config.chat.max_message_chars, config.chat.preview_chars);

        Self {
            db_pool,
            rate_limit,
            jwt_config: Arc::new(jwt_config),
            cache,
            lockout: Arc::new(lockout),
            password_policy,
            rotate_refresh_tokens: config.security.rotate_refresh_tokens,
            otp_expiry_mins: config.otp.expiry_mins,
            metrics,
            registry,
            gateway,
            chat,
        }
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let rate_limit_state = state.rate_limit.clone();

    let metrics_state = state.metrics.clone();
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check_simple))
        .route("/health/status", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::ready_check))
        .route("/health/live", get(handlers::health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .route("/companies/{id}", get(handlers::companies::get_company))
        .route(
            "/companies/{id}/jobs",
            get(handlers::companies::list_company_jobs),
        )
        .route("/jobs", get(handlers::jobs::list_jobs))
        .route("/jobs/{id}", get(handlers::jobs::get_job))
        // The WebSocket handler verifies its own token so browser clients
        // can pass it as a query parameter during the upgrade.
        .route("/ws", get(realtime::ws_handler))
        .with_state(state.clone());

    let auth_routes = Router::new()
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/confirm-otp", post(handlers::auth::confirm_otp))
        .route("/auth/signin", post(handlers::auth::signin))
        .route("/auth/refresh", post(handlers::auth::refresh_token))
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        .layer(axum_middleware::from_fn(auth_rate_limit_middleware))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/auth/me", get(handlers::auth::get_current_user))
        .route("/users/me", get(handlers::users::get_profile))
        .route("/users/me", patch(handlers::users::update_profile))
        .route("/users/me", delete(handlers::users::delete_account))
        .route("/companies", post(handlers::companies::create_company))
        .route(
            "/companies/{id}",
            patch(handlers::companies::update_company),
        )
        .route(
            "/companies/{id}",
            delete(handlers::companies::delete_company),
        )
        .route("/companies/{id}/hrs", post(handlers::companies::add_hr))
        .route(
            "/companies/{id}/hrs/{user_id}",
            delete(handlers::companies::remove_hr),
        )
        .route("/jobs", post(handlers::jobs::create_job))
        .route("/jobs/{id}", patch(handlers::jobs::update_job))
        .route("/jobs/{id}", delete(handlers::jobs::delete_job))
        .route("/jobs/{id}/apply", post(handlers::jobs::apply_to_job))
        .route(
            "/jobs/{id}/applications",
            get(handlers::jobs::list_job_applications),
        )
        .route(
            "/applications/{id}/status",
            patch(handlers::applications::update_status),
        )
        .route(
            "/applications/mine",
            get(handlers::applications::list_my_applications),
        )
        .route("/chat/messages", post(handlers::chat::send_message))
        .route("/chat/history/{user_id}", get(handlers::chat::get_history))
        .route(
            "/chat/conversations",
            get(handlers::chat::list_conversations),
        )
        .route("/chat/unread-count", get(handlers::chat::unread_count))
        .route(
            "/chat/conversations/{id}/read",
            post(handlers::chat::mark_read),
        )
        .route(
            "/chat/conversations/{id}",
            delete(handlers::chat::delete_conversation),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/users", get(handlers::admin::list_users))
        .route("/admin/users/{id}/ban", post(handlers::admin::ban_user))
        .route("/admin/users/{id}/unban", post(handlers::admin::unban_user))
        .route("/admin/users/{id}", delete(handlers::admin::delete_user))
        .route(
            "/admin/companies/{id}/approve",
            post(handlers::admin::approve_company),
        )
        .route(
            "/admin/companies/{id}/ban",
            post(handlers::admin::ban_company),
        )
        .layer(axum_middleware::from_fn(middleware::auth::admin_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .with_state(state.clone());

    let docs_routes = openapi::swagger_router();

    Router::new()
        .merge(docs_routes)
        .merge(public_routes)
        .merge(auth_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(rate_limit_state))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found", "code": "NOT_FOUND"})),
    )
}

fn parse_all<T: std::str::FromStr>(values: &[String]) -> Vec<T> {
    values.iter().filter_map(|v| v.parse().ok()).collect()
}

// `Any` origin and `allow_credentials(true)` are mutually exclusive in
// tower-http, so the credentialed wildcard case mirrors the request origin
// instead.
fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::{HeaderValue, Method};

    let cors = &config.cors;
    let wildcard = cors.allowed_origins.is_empty() || cors.allowed_origins.iter().any(|o| o == "*");

    let base = CorsLayer::new()
        .allow_methods(parse_all::<Method>(&cors.allowed_methods))
        .allow_headers(parse_all::<HeaderName>(&cors.allowed_headers))
        .allow_credentials(cors.allow_credentials)
        .max_age(Duration::from_secs(cors.max_age_secs));

    match (wildcard, cors.allow_credentials) {
        (true, true) => base.allow_origin(tower_http::cors::AllowOrigin::mirror_request()),
        (true, false) => base.allow_origin(Any),
        (false, _) => base.allow_origin(parse_all::<HeaderValue>(&cors.allowed_origins)),
    }
}

fn build_db_pool(url: &str, max: u32, min: u32, connect_secs: u64, idle_secs: u64) -> DbPool {
    r2d2::Pool::builder()
        .max_size(max)
        .min_idle(Some(min))
        .connection_timeout(Duration::from_secs(connect_secs))
        .idle_timeout(Some(Duration::from_secs(idle_secs)))
        .build(ConnectionManager::<PgConnection>::new(url))
        .expect("Failed to create database pool")
}

pub fn create_db_pool(config: &config::Config) -> DbPool {
    let db = &config.database;
    build_db_pool(
        &db.url,
        db.max_connections,
        db.min_connections,
        db.connection_timeout_secs,
        db.idle_timeout_secs,
    )
}

pub fn create_db_pool_with_url(database_url: &str) -> DbPool {
    build_db_pool(database_url, 10, 2, 30, 600)
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_cloneable() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_cors_layer_builds_for_every_origin_shape() {
        let mut config = Config::default_for_testing();

        config.cors.allowed_origins = vec!["*".to_string()];
        let _ = build_cors_layer(&config);

        config.cors.allowed_origins =
            vec!["http://localhost:3000".to_string(), "https://hireline.dev".to_string()];
        let _ = build_cors_layer(&config);

        config.cors.allowed_origins.clear();
        config.cors.allow_credentials = true;
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn test_parse_all_skips_invalid_entries() {
        let methods = parse_all::<axum::http::Method>(&[
            "GET".to_string(),
            "not a method !!".to_string(),
            "POST".to_string(),
        ]);
        assert_eq!(methods.len(), 2);
    }
}
