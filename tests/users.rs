//! Profile management integration tests.

mod common;

use common::{create_confirmed_user, TestApp};
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn profile_returns_current_user() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_confirmed_user(&app).await;

    // Act
    let response = app.get("/users/me", &user.access_token).await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["email"], user.email);
}

#[tokio::test]
#[serial]
async fn profile_update_applies_partial_changes() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_confirmed_user(&app).await;

    // Act - Only the first name changes
    let response = app
        .patch(
            "/users/me",
            &user.access_token,
            json!({ "first_name": "Renamed" }),
        )
        .await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["first_name"], "Renamed");
    assert_eq!(body["last_name"], "User");
}

#[tokio::test]
#[serial]
async fn account_deletion_blocks_further_signin() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_confirmed_user(&app).await;

    // Act
    let response = app.delete("/users/me", &user.access_token).await;
    assert_status!(response, 204);

    // Assert
    let signin = app
        .post_public(
            "/auth/signin",
            json!({ "email": user.email, "password": user.password }),
        )
        .await;
    assert_status!(signin, 403);
    let body: serde_json::Value = signin.json().await.expect("Invalid body");
    assert_eq!(body["code"], "ACCOUNT_DELETED");
}
