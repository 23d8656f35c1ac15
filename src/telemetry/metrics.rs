//! Prometheus metrics for auth, authorization, chat, and HTTP traffic.

use axum::extract::State;
use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// The recorder is process-global; repeated AppState construction in tests
// must reuse the first installation.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(enabled: bool) -> Self {
        let handle = enabled.then(|| {
            PROMETHEUS_HANDLE
                .get_or_init(|| {
                    PrometheusBuilder::new()
                        .install_recorder()
                        .expect("Failed to install Prometheus recorder")
                })
                .clone()
        });

        Self { handle }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    match state.render() {
        Some(body) => (StatusCode::OK, body),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not enabled".to_string(),
        ),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AuthOutcome {
    Success,
    InvalidCredentials,
    AccountLocked,
    AccountInactive,
}

impl AuthOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Success => "success",
            AuthOutcome::InvalidCredentials => "invalid_credentials",
            AuthOutcome::AccountLocked => "account_locked",
            AuthOutcome::AccountInactive => "account_inactive",
        }
    }
}

pub fn record_auth_attempt(action: &str, outcome: AuthOutcome) {
    counter!(
        "auth_attempts_total",
        "action" => action.to_string(),
        "outcome" => outcome.as_str().to_string()
    )
    .increment(1);
}

pub fn record_authz_check(cached: bool, granted: bool, duration: std::time::Duration) {
    counter!(
        "authz_checks_total",
        "cached" => cached.to_string(),
        "granted" => granted.to_string()
    )
    .increment(1);

    histogram!(
        "authz_check_duration_seconds",
        "cached" => cached.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_message_sent(conversation_created: bool) {
    counter!(
        "chat_messages_sent_total",
        "conversation_created" => conversation_created.to_string()
    )
    .increment(1);
}

pub fn record_application_submitted() {
    counter!("applications_submitted_total").increment(1);
}

pub fn record_ws_connection(connected: bool) {
    gauge!("ws_connections").increment(if connected { 1.0 } else { -1.0 });
}

pub fn record_request_latency(
    method: &str,
    path: &str,
    status: u16,
    duration: std::time::Duration,
) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}
