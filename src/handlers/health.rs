//! Health and readiness probes.

use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "hireline")]
    pub service: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    #[schema(example = "2026-03-02T08:15:00Z")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    #[schema(example = "ready")]
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessChecks {
    pub database: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<ComponentStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentStatus {
    #[schema(example = "up")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 5)]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "connection refused (os error 111)")]
    pub error: Option<String>,
}

impl ComponentStatus {
    pub fn up(latency_ms: u64) -> Self {
        Self {
            status: "up".to_string(),
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Simple health check", content_type = "text/plain")
    )
)]
pub async fn health_check_simple() -> &'static str {
    "OK"
}

#[utoipa::path(
    get,
    path = "/health/status",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "hireline".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Some(chrono::Utc::now().to_rfc3339()),
    })
}

/// Readiness gates on the database; Redis is reported but only fails the
/// probe when a pool is configured and unreachable.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service is not ready", body = ReadinessResponse)
    )
)]
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let database = check_database(&state);
    let redis = check_redis(&state).await;

    let ready = database.is_up() && redis.as_ref().map(ComponentStatus::is_up).unwrap_or(true);

    let response = ReadinessResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks { database, redis },
    };

    if ready {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

fn check_database(state: &AppState) -> ComponentStatus {
    let start = std::time::Instant::now();

    let mut conn = match state.db_pool.get() {
        Ok(conn) => conn,
        Err(e) => return ComponentStatus::down(format!("Failed to get connection: {}", e)),
    };

    match diesel::sql_query("SELECT 1").execute(&mut conn) {
        Ok(_) => ComponentStatus::up(start.elapsed().as_millis() as u64),
        Err(e) => ComponentStatus::down(format!("Query failed: {}", e)),
    }
}

async fn check_redis(state: &AppState) -> Option<ComponentStatus> {
    let pool = state.cache.token_revocation.pool()?;
    let start = std::time::Instant::now();

    let status = match pool.get().await {
        Ok(mut conn) => {
            match redis::cmd("PING").query_async::<String>(&mut conn).await {
                Ok(_) => ComponentStatus::up(start.elapsed().as_millis() as u64),
                Err(e) => ComponentStatus::down(format!("Ping failed: {}", e)),
            }
        }
        Err(e) => ComponentStatus::down(format!("Connection failed: {}", e)),
    };

    Some(status)
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive")
    )
)]
pub async fn live_check() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_status_constructors() {
        let up = ComponentStatus::up(10);
        assert!(up.is_up());
        assert_eq!(up.latency_ms, Some(10));
        assert!(up.error.is_none());

        let down = ComponentStatus::down("Connection refused");
        assert!(!down.is_up());
        assert!(down.latency_ms.is_none());
        assert_eq!(down.error, Some("Connection refused".to_string()));
    }

    #[tokio::test]
    async fn test_health_check_reports_service() {
        let response = health_check().await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.service, "hireline");
        assert!(response.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_health_check_simple() {
        assert_eq!(health_check_simple().await, "OK");
    }
}
