//! Application status handlers.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    authz::{self, CompanyRef},
    error::{get_db_conn, ApiError, ApiResult},
    events::{
        outbox::OutboxService, AggregateType, ApplicationStatusChangedPayload, EventType,
    },
    handlers::auth::ErrorResponse,
    helpers::get_user_id,
    models::{Application, ApplicationStatus},
    pagination::{IntoPaginated, PaginatedResponse, PaginationParams},
    schema::applications,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(example = "in-consideration")]
    pub status: String,
}

#[utoipa::path(
    patch,
    path = "/applications/{id}/status",
    tag = "Applications",
    params(("id" = Uuid, Path, description = "Application id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = Application),
        (status = 400, description = "Unknown status", body = ErrorResponse),
        (status = 403, description = "Not HR or owner of the hiring company", body = ErrorResponse),
        (status = 404, description = "Application not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(application_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Application>> {
    let new_status = ApplicationStatus::parse(&payload.status).ok_or_else(|| {
        ApiError::bad_request(
            format!("Unknown application status: {}", payload.status),
            "INVALID_STATUS",
        )
    })?;

    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let application: Application = applications::table
        .filter(applications::id.eq(application_id))
        .select(Application::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Application not found", "APPLICATION_NOT_FOUND"))?;

    let company_id =
        authz::require_hr_or_owner(&mut conn, user_id, CompanyRef::application(application_id))?;

    let old_status = application.status.clone();

    let updated: Application =
        diesel::update(applications::table.filter(applications::id.eq(application_id)))
            .set((
                applications::status.eq(new_status.as_str()),
                applications::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(&mut conn)
            .map_err(|e| {
                error!(error = %e, "Failed to update application status");
                ApiError::internal("Failed to update status", "UPDATE_ERROR")
            })?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::ApplicationStatusChanged,
        AggregateType::Application,
        application_id,
        serde_json::to_value(ApplicationStatusChangedPayload {
            job_id: application.job_id,
            applicant_id: application.user_id,
            old_status,
            new_status: new_status.as_str().to_string(),
        })
        .unwrap_or_default(),
        Some(user_id),
        Some(company_id),
        None,
    );

    // Decision notifications are best-effort; delivery is an external
    // concern and never rolls back the status change.
    if matches!(
        new_status,
        ApplicationStatus::Accepted | ApplicationStatus::Rejected
    ) {
        info!(
            application_id = %application_id,
            applicant_id = %application.user_id,
            status = new_status.as_str(),
            "Applicant decision notification queued"
        );
    }

    info!(
        application_id = %application_id,
        status = new_status.as_str(),
        "Application status updated"
    );

    Ok(Json(updated))
}

#[utoipa::path(
    get,
    path = "/applications/mine",
    tag = "Applications",
    params(PaginationParams),
    responses(
        (status = 200, description = "The caller's applications", body = PaginatedResponse<Application>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_my_applications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Application>>> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let total: i64 = applications::table
        .filter(applications::user_id.eq(user_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();

    let data: Vec<Application> = applications::table
        .filter(applications::user_id.eq(user_id))
        .order(applications::created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(Application::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Json(data.into_paginated(&pagination, total)))
}
