//! Observability: tracing, metrics, and OpenTelemetry integration.

pub mod metrics;
pub mod tracing;

pub use metrics::{
    record_application_submitted, record_auth_attempt, record_authz_check, record_message_sent,
    record_ws_connection, AuthOutcome, MetricsState,
};
pub use tracing::init_telemetry;
