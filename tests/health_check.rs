//! Probe endpoint integration tests.

mod common;

use common::TestApp;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn plain_health_endpoint_answers_ok_without_credentials() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/health", app.base_url))
        .send()
        .await
        .expect("health request failed");

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.expect("no body"), "OK");
}

#[tokio::test]
#[serial]
async fn health_status_reports_service_and_version() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/status").await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.expect("invalid JSON body");
    assert_eq!(body["service"], "hireline");
    assert!(body["version"].is_string());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
#[serial]
async fn readiness_probe_reports_database_status() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/ready").await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.expect("invalid JSON body");
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["database"]["status"], "up");
}

#[tokio::test]
#[serial]
async fn liveness_probe_answers_ok() {
    let app = TestApp::spawn().await;
    assert_eq!(app.get_public("/health/live").await.status().as_u16(), 200);
}

#[tokio::test]
#[serial]
async fn unknown_route_is_not_served() {
    let app = TestApp::spawn().await;

    // Unmatched paths fall through to either the router's 404 or the auth
    // middleware's 401 depending on which nest they land in.
    let status = app.get_public("/no-such-endpoint").await.status().as_u16();
    assert!(status == 404 || status == 401, "got {status}");
}
