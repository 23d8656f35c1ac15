//! Authentication flow integration tests.
//!
//! Covers signup with email confirmation, signin, token refresh, logout,
//! and the password reset flow.

mod common;

use common::{create_confirmed_user, SignupResponse, TestApp};
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn signup_returns_unconfirmed_user_and_code() {
    // Arrange
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();

    // Act
    let signup = app
        .signup(&email, "Password123!")
        .await
        .expect("Signup failed");

    // Assert
    assert_eq!(signup.user.email, email);
    assert!(!signup.user.is_confirmed);
    assert_eq!(signup.user.role, "User");
    let code = signup.confirmation_code.expect("Expected confirmation code");
    assert_eq!(code.len(), 6);
}

#[tokio::test]
#[serial]
async fn signup_with_duplicate_email_returns_conflict() {
    // Arrange
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    app.signup(&email, "Password123!").await.expect("Signup failed");

    // Act
    let response = app
        .post_public(
            "/auth/signup",
            json!({
                "email": email,
                "password": "Password123!",
                "first_name": "Test",
                "last_name": "User"
            }),
        )
        .await;

    // Assert
    assert_status!(response, 409);
}

#[tokio::test]
#[serial]
async fn signin_before_confirmation_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    app.signup(&email, "Password123!").await.expect("Signup failed");

    // Act
    let response = app
        .post_public(
            "/auth/signin",
            json!({ "email": email, "password": "Password123!" }),
        )
        .await;

    // Assert
    assert_status!(response, 403);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["code"], "EMAIL_NOT_CONFIRMED");
}

#[tokio::test]
#[serial]
async fn confirm_with_wrong_code_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    app.signup(&email, "Password123!").await.expect("Signup failed");

    // Act
    let response = app.confirm(&email, "000000").await;

    // Assert
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn full_signup_confirm_signin_flow_works() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let user = create_confirmed_user(&app).await;

    // Assert
    assert!(!user.access_token.is_empty());
    assert!(!user.refresh_token.is_empty());

    let me = app.get("/auth/me", &user.access_token).await;
    assert_success!(me);
    let body: serde_json::Value = me.json().await.expect("Invalid body");
    assert_eq!(body["email"], user.email);
    assert_eq!(body["is_confirmed"], true);
}

#[tokio::test]
#[serial]
async fn signin_with_wrong_password_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_confirmed_user(&app).await;

    // Act
    let response = app
        .post_public(
            "/auth/signin",
            json!({ "email": user.email, "password": "wrong-password" }),
        )
        .await;

    // Assert
    assert_status!(response, 401);
}

#[tokio::test]
#[serial]
async fn refresh_token_issues_new_access_token() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_confirmed_user(&app).await;

    // Act
    let response = app
        .post_public(
            "/auth/refresh",
            json!({ "refresh_token": user.refresh_token }),
        )
        .await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert!(body["access_token"].as_str().is_some());
}

#[tokio::test]
#[serial]
async fn logout_invalidates_refresh_token() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_confirmed_user(&app).await;

    // Act
    let response = app
        .post_public(
            "/auth/logout",
            json!({ "refresh_token": user.refresh_token }),
        )
        .await;
    assert_status!(response, 204);

    let refresh = app
        .post_public(
            "/auth/refresh",
            json!({ "refresh_token": user.refresh_token }),
        )
        .await;

    // Assert
    assert_status!(refresh, 401);
}

#[tokio::test]
#[serial]
async fn password_reset_flow_works_end_to_end() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_confirmed_user(&app).await;

    // Act - Request a reset code
    let response = app
        .post_public("/auth/forgot-password", json!({ "email": user.email }))
        .await;
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    let code = body["reset_code"].as_str().expect("Expected reset code");

    // Act - Reset with the code
    let response = app
        .post_public(
            "/auth/reset-password",
            json!({
                "email": user.email,
                "code": code,
                "password": "NewPassword456!"
            }),
        )
        .await;
    assert_success!(response);

    // Assert - Old password fails, new one works
    let old = app
        .post_public(
            "/auth/signin",
            json!({ "email": user.email, "password": user.password }),
        )
        .await;
    assert_status!(old, 401);

    let new = app
        .signin(&user.email, "NewPassword456!")
        .await
        .expect("Signin with new password failed");
    assert!(!new.access_token.is_empty());
}

#[tokio::test]
#[serial]
async fn forgot_password_for_unknown_email_returns_no_code() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app
        .post_public(
            "/auth/forgot-password",
            json!({ "email": TestApp::unique_email() }),
        )
        .await;

    // Assert - No account enumeration: the response shape stays the same.
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert!(body["reset_code"].is_null());
}

#[tokio::test]
#[serial]
async fn protected_route_without_token_is_unauthorized() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app.get_public("/auth/me").await;

    // Assert
    assert_status!(response, 401);
}

#[tokio::test]
#[serial]
async fn signup_emits_outbox_event() {
    // Arrange
    let app = TestApp::spawn().await;
    let before = app.count_outbox_events("user.registered");
    let email = TestApp::unique_email();

    // Act
    let _: SignupResponse = app.signup(&email, "Password123!").await.expect("Signup failed");

    // Assert
    let after = app.count_outbox_events("user.registered");
    assert_eq!(after, before + 1);
}
