//! Admin moderation integration tests.

mod common;

use common::{create_admin_user, create_approved_company, create_confirmed_user, TestApp};
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn admin_routes_reject_regular_users() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_confirmed_user(&app).await;

    // Act
    let response = app.get("/admin/users", &user.access_token).await;

    // Assert
    assert_status!(response, 403);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["code"], "ADMIN_ONLY");
}

#[tokio::test]
#[serial]
async fn admin_can_list_users_with_search() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let user = create_confirmed_user(&app).await;

    // Act
    let response = app
        .get(
            &format!("/admin/users?search={}", user.email),
            &admin.access_token,
        )
        .await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    let data = body["data"].as_array().expect("Expected data array");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["email"], user.email);
}

#[tokio::test]
#[serial]
async fn banned_user_cannot_sign_in() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let user = create_confirmed_user(&app).await;

    // Act
    let response = app
        .post(
            &format!("/admin/users/{}/ban", user.id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 204);

    let signin = app
        .post_public(
            "/auth/signin",
            json!({ "email": user.email, "password": user.password }),
        )
        .await;

    // Assert
    assert_status!(signin, 403);
    let body: serde_json::Value = signin.json().await.expect("Invalid body");
    assert_eq!(body["code"], "ACCOUNT_BANNED");

    // Their refresh token is gone too.
    let refresh = app
        .post_public(
            "/auth/refresh",
            json!({ "refresh_token": user.refresh_token }),
        )
        .await;
    assert_client_error!(refresh);
}

#[tokio::test]
#[serial]
async fn unban_restores_access() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let user = create_confirmed_user(&app).await;

    app.post(
        &format!("/admin/users/{}/ban", user.id),
        &admin.access_token,
        json!({}),
    )
    .await;

    // Act
    let response = app
        .post(
            &format!("/admin/users/{}/unban", user.id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 204);

    // Assert
    let signin = app
        .signin(&user.email, &user.password)
        .await
        .expect("Signin after unban failed");
    assert!(!signin.access_token.is_empty());
}

#[tokio::test]
#[serial]
async fn admin_delete_user_is_soft_and_blocks_signin() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let user = create_confirmed_user(&app).await;

    // Act
    let response = app
        .delete(&format!("/admin/users/{}", user.id), &admin.access_token)
        .await;
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

    // Deleting again is a 404 since the account is already gone.
    let response = app
        .delete(&format!("/admin/users/{}", user.id), &admin.access_token)
        .await;
    assert_status!(response, 404);
}

#[tokio::test]
#[serial]
async fn admin_approval_unlocks_job_posting() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let owner = create_confirmed_user(&app).await;

    let response = app
        .post(
            "/companies",
            &owner.access_token,
            json!({
                "name": format!("Acme {}", Uuid::new_v4()),
                "email": TestApp::unique_email()
            }),
        )
        .await;
    let company: serde_json::Value = response.json().await.expect("Invalid body");
    let company_id = company["id"].as_str().unwrap().to_string();

    // Act
    let response = app
        .post(
            &format!("/admin/companies/{}/approve", company_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["approved_by_admin"], true);

    // Assert - The owner can now post jobs
    let response = app
        .post(
            "/jobs",
            &owner.access_token,
            json!({
                "company_id": company_id,
                "title": "Backend Engineer",
                "description": "Build and run the hiring backend services.",
                "location": "Remote",
                "job_type": "full-time"
            }),
        )
        .await;
    assert_success!(response);
}

#[tokio::test]
#[serial]
async fn banned_company_cannot_post_jobs() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let owner = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;

    // Act
    let response = app
        .post(
            &format!("/admin/companies/{}/ban", company_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_success!(response);

    let response = app
        .post(
            "/jobs",
            &owner.access_token,
            json!({
                "company_id": company_id,
                "title": "Backend Engineer",
                "description": "Build and run the hiring backend services.",
                "location": "Remote",
                "job_type": "full-time"
            }),
        )
        .await;

    // Assert
    assert_status!(response, 403);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["code"], "COMPANY_BANNED");

    assert!(app.count_outbox_events("company.banned") >= 1);
}
