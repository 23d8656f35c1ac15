//! Job posting and application pipeline integration tests.

mod common;

use common::{create_approved_company, create_confirmed_user, create_job, TestApp};
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn create_job_requires_approved_company() {
    // Arrange
    let app = TestApp::spawn().await;
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

    // Act - Company is not yet approved
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
    assert_eq!(body["code"], "COMPANY_NOT_APPROVED");
}

#[tokio::test]
#[serial]
async fn job_listing_is_public_and_filterable() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    // Act
    let response = app
        .get_public(&format!("/jobs?company_id={}", company_id))
        .await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    let data = body["data"].as_array().expect("Expected data array");
    assert!(data.iter().any(|j| j["id"] == job_id.to_string()));

    let detail = app.get_public(&format!("/jobs/{}", job_id)).await;
    assert_success!(detail);
}

#[tokio::test]
#[serial]
async fn non_staff_cannot_create_job_for_company() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let stranger = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;

    // Act
    let response = app
        .post(
            "/jobs",
            &stranger.access_token,
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
}

#[tokio::test]
#[serial]
async fn hr_staff_can_update_job() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let hr = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    app.post(
        &format!("/companies/{}/hrs", company_id),
        &owner.access_token,
        json!({ "user_id": hr.id }),
    )
    .await;

    // Act
    let response = app
        .patch(
            &format!("/jobs/{}", job_id),
            &hr.access_token,
            json!({ "title": "Senior Backend Engineer" }),
        )
        .await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["title"], "Senior Backend Engineer");
}

#[tokio::test]
#[serial]
async fn jobs_of_soft_deleted_company_are_not_found_to_staff() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    app.soft_delete_company_db(company_id);

    // Act - The owner can no longer reach the job through staff operations.
    let response = app
        .patch(
            &format!("/jobs/{}", job_id),
            &owner.access_token,
            json!({ "title": "Senior Backend Engineer" }),
        )
        .await;
    assert_status!(response, 404);

    let response = app
        .delete(&format!("/jobs/{}", job_id), &owner.access_token)
        .await;

    // Assert - Deletion goes through the owner check and is 404 too.
    assert_status!(response, 404);
}

#[tokio::test]
#[serial]
async fn jobs_of_banned_company_are_forbidden_to_staff() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let hr = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    app.post(
        &format!("/companies/{}/hrs", company_id),
        &owner.access_token,
        json!({ "user_id": hr.id }),
    )
    .await;

    app.ban_company_db(company_id);

    // Act
    let response = app
        .patch(
            &format!("/jobs/{}", job_id),
            &hr.access_token,
            json!({ "title": "Senior Backend Engineer" }),
        )
        .await;

    // Assert
    assert_status!(response, 403);

    let response = app
        .get(&format!("/jobs/{}/applications", job_id), &owner.access_token)
        .await;
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn apply_to_job_creates_pending_application() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let applicant = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    // Act
    let response = app
        .post(
            &format!("/jobs/{}/apply", job_id),
            &applicant.access_token,
            json!({ "cv_url": "https://example.com/cv.pdf" }),
        )
        .await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["user_id"], applicant.id.to_string());

    assert!(app.count_outbox_events("application.submitted") >= 1);
}

#[tokio::test]
#[serial]
async fn duplicate_application_returns_conflict() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let applicant = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    let first = app
        .post(
            &format!("/jobs/{}/apply", job_id),
            &applicant.access_token,
            json!({ "cv_url": "https://example.com/cv.pdf" }),
        )
        .await;
    assert_success!(first);

    // Act
    let second = app
        .post(
            &format!("/jobs/{}/apply", job_id),
            &applicant.access_token,
            json!({ "cv_url": "https://example.com/cv.pdf" }),
        )
        .await;

    // Assert
    assert_status!(second, 409);
}

#[tokio::test]
#[serial]
async fn applying_to_closed_job_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let applicant = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    let response = app
        .patch(
            &format!("/jobs/{}", job_id),
            &owner.access_token,
            json!({ "closed": true }),
        )
        .await;
    assert_success!(response);

    // Act
    let response = app
        .post(
            &format!("/jobs/{}/apply", job_id),
            &applicant.access_token,
            json!({ "cv_url": "https://example.com/cv.pdf" }),
        )
        .await;

    // Assert
    assert_status!(response, 400);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["code"], "JOB_CLOSED");
}

#[tokio::test]
#[serial]
async fn staff_can_move_application_through_pipeline() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let applicant = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    let response = app
        .post(
            &format!("/jobs/{}/apply", job_id),
            &applicant.access_token,
            json!({ "cv_url": "https://example.com/cv.pdf" }),
        )
        .await;
    let application: serde_json::Value = response.json().await.expect("Invalid body");
    let application_id = application["id"].as_str().unwrap().to_string();

    // Act - Applicant cannot change their own status
    let response = app
        .patch(
            &format!("/applications/{}/status", application_id),
            &applicant.access_token,
            json!({ "status": "accepted" }),
        )
        .await;
    assert_status!(response, 403);

    // Act - Unknown status is rejected
    let response = app
        .patch(
            &format!("/applications/{}/status", application_id),
            &owner.access_token,
            json!({ "status": "hired-maybe" }),
        )
        .await;
    assert_status!(response, 400);

    // Act - Owner moves it forward
    let response = app
        .patch(
            &format!("/applications/{}/status", application_id),
            &owner.access_token,
            json!({ "status": "in-consideration" }),
        )
        .await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["status"], "in-consideration");

    let event = app
        .get_latest_outbox_event("application.status_changed")
        .expect("Expected status change event");
    assert_eq!(event.aggregate_id, Uuid::parse_str(&application_id).unwrap());
}

#[tokio::test]
#[serial]
async fn applicant_sees_their_applications() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let applicant = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    app.post(
        &format!("/jobs/{}/apply", job_id),
        &applicant.access_token,
        json!({ "cv_url": "https://example.com/cv.pdf" }),
    )
    .await;

    // Act
    let response = app.get("/applications/mine", &applicant.access_token).await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    let data = body["data"].as_array().expect("Expected data array");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["job_id"], job_id.to_string());
}

#[tokio::test]
#[serial]
async fn job_applications_listing_requires_staff() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let applicant = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    app.post(
        &format!("/jobs/{}/apply", job_id),
        &applicant.access_token,
        json!({ "cv_url": "https://example.com/cv.pdf" }),
    )
    .await;

    // Act - Applicant cannot list the job's applications
    let response = app
        .get(
            &format!("/jobs/{}/applications", job_id),
            &applicant.access_token,
        )
        .await;
    assert_status!(response, 403);

    // Act - Owner can
    let response = app
        .get(&format!("/jobs/{}/applications", job_id), &owner.access_token)
        .await;

    // Assert
    assert_success!(response);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["meta"]["total"], 1);
}

#[tokio::test]
#[serial]
async fn delete_job_requires_owner_and_removes_applications() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = create_confirmed_user(&app).await;
    let hr = create_confirmed_user(&app).await;
    let company_id = create_approved_company(&app, &owner).await;
    let job_id = create_job(&app, &owner, company_id).await;

    app.post(
        &format!("/companies/{}/hrs", company_id),
        &owner.access_token,
        json!({ "user_id": hr.id }),
    )
    .await;

    // Act - HR staff cannot delete jobs
    let response = app
        .delete(&format!("/jobs/{}", job_id), &hr.access_token)
        .await;
    assert_status!(response, 403);

    // Act - Owner can
    let response = app
        .delete(&format!("/jobs/{}", job_id), &owner.access_token)
        .await;
    assert_status!(response, 204);

    // Assert
    let response = app.get_public(&format!("/jobs/{}", job_id)).await;
    assert_status!(response, 404);
}
