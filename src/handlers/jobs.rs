//! Job posting and application submission handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::jwt::Claims,
    authz::{self, CompanyRef},
    error::{conflict_on_unique, get_db_conn, ApiError, ApiResult},
    events::{
        outbox::OutboxService, AggregateType, ApplicationSubmittedPayload, EventType,
    },
    handlers::auth::ErrorResponse,
    helpers::get_user_id,
    models::{Application, ApplicationStatus, Company, Job, NewApplication, NewJob},
    pagination::{IntoPaginated, PaginatedResponse, PaginationParams},
    schema::{applications, companies, jobs},
    telemetry::record_application_submitted,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateJobRequest {
    #[schema(example = "4f8a2d1e-0c3b-4e5f-9a67-2b1d8c9e0f34")]
    pub company_id: Uuid,
    #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
    #[schema(example = "Backend Engineer")]
    pub title: String,
    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: String,
    #[schema(example = "Berlin")]
    pub location: String,
    #[schema(example = "full-time")]
    pub job_type: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateJobRequest {
    #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub closed: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobFilters {
    /// Restrict to a single company.
    pub company_id: Option<Uuid>,
    /// Only jobs still accepting applications.
    pub open_only: Option<bool>,
    /// Case-insensitive substring match on the title.
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ApplyRequest {
    #[validate(url(message = "CV URL must be a valid URL"))]
    #[schema(example = "https://files.example/cv.pdf")]
    pub cv_url: String,
}

fn find_job(conn: &mut PgConnection, job_id: Uuid) -> Result<Option<Job>, diesel::result::Error> {
    jobs::table
        .filter(jobs::id.eq(job_id))
        .select(Job::as_select())
        .first(conn)
        .optional()
}

#[utoipa::path(
    post,
    path = "/jobs",
    tag = "Jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 200, description = "Job created", body = Job),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 403, description = "Not HR or owner of the company", body = ErrorResponse),
        (status = 404, description = "Company not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_job(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateJobRequest>,
) -> ApiResult<Json<Job>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let company: Company = companies::table
        .filter(companies::id.eq(payload.company_id))
        .filter(companies::deleted_at.is_null())
        .select(Company::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Company not found", "COMPANY_NOT_FOUND"))?;

    authz::require_hr_or_owner(&mut conn, user_id, CompanyRef::company(company.id))?;

    if !company.approved_by_admin {
        return Err(ApiError::forbidden(
            "Company is not approved yet",
            "COMPANY_NOT_APPROVED",
        ));
    }
    if company.banned_at.is_some() {
        return Err(ApiError::forbidden("Company is banned", "COMPANY_BANNED"));
    }

    let job: Job = diesel::insert_into(jobs::table)
        .values(&NewJob {
            company_id: company.id,
            title: payload.title,
            description: payload.description,
            location: payload.location,
            job_type: payload.job_type,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to create job");
            ApiError::internal("Failed to create job", "CREATE_ERROR")
        })?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::JobCreated,
        AggregateType::Job,
        job.id,
        serde_json::json!({"title": job.title, "company_id": company.id.to_string()}),
        Some(user_id),
        Some(company.id),
        None,
    );

    info!(job_id = %job.id, company_id = %company.id, "Job created");
    Ok(Json(job))
}

#[utoipa::path(
    get,
    path = "/jobs",
    tag = "Jobs",
    params(JobFilters, PaginationParams),
    responses(
        (status = 200, description = "Paginated job listings", body = PaginatedResponse<Job>)
    )
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filters): Query<JobFilters>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Job>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let apply_filters = |mut query: jobs::BoxedQuery<'static, diesel::pg::Pg>| -> jobs::BoxedQuery<'static, diesel::pg::Pg> {
        if let Some(company_id) = filters.company_id {
            query = query.filter(jobs::company_id.eq(company_id));
        }
        if filters.open_only.unwrap_or(false) {
            query = query.filter(jobs::closed.eq(false));
        }
        if let Some(search) = &filters.search {
            query = query.filter(jobs::title.ilike(format!("%{}%", search)));
        }
        query
    };

    let total: i64 = apply_filters(jobs::table.into_boxed())
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();

    let data: Vec<Job> = apply_filters(jobs::table.into_boxed())
        .order(jobs::created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(Job::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Json(data.into_paginated(&pagination, total)))
}

#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job details", body = Job),
        (status = 404, description = "Job not found", body = ErrorResponse)
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let job = find_job(&mut conn, job_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Job not found", "JOB_NOT_FOUND"))?;

    Ok(Json(job))
}

#[utoipa::path(
    put,
    path = "/jobs/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = UpdateJobRequest,
    responses(
        (status = 200, description = "Job updated", body = Job),
        (status = 403, description = "Not HR or owner of the company", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_job(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(job_id): Path<Uuid>,
    Json(payload): Json<UpdateJobRequest>,
) -> ApiResult<Json<Job>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let mut job = find_job(&mut conn, job_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Job not found", "JOB_NOT_FOUND"))?;

    let company_id = authz::require_hr_or_owner(&mut conn, user_id, CompanyRef::job(job_id))?;

    if let Some(title) = payload.title {
        job.title = title;
    }
    if let Some(description) = payload.description {
        job.description = description;
    }
    if let Some(location) = payload.location {
        job.location = location;
    }
    if let Some(job_type) = payload.job_type {
        job.job_type = job_type;
    }
    let closing = payload.closed == Some(true) && !job.closed;
    if let Some(closed) = payload.closed {
        job.closed = closed;
    }

    let updated: Job = diesel::update(jobs::table.filter(jobs::id.eq(job_id)))
        .set((
            jobs::title.eq(&job.title),
            jobs::description.eq(&job.description),
            jobs::location.eq(&job.location),
            jobs::job_type.eq(&job.job_type),
            jobs::closed.eq(job.closed),
            jobs::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to update job");
            ApiError::internal("Failed to update job", "UPDATE_ERROR")
        })?;

    let event_type = if closing {
        EventType::JobClosed
    } else {
        EventType::JobUpdated
    };

    let _ = OutboxService::emit(
        &mut conn,
        event_type,
        AggregateType::Job,
        job_id,
        serde_json::json!({"title": updated.title, "closed": updated.closed}),
        Some(user_id),
        Some(company_id),
        None,
    );

    info!(job_id = %job_id, closed = updated.closed, "Job updated");
    Ok(Json(updated))
}

/// Deletes a job and its applications. Restricted to the company owner;
/// HR status is not sufficient.
#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 204, description = "Job deleted"),
        (status = 403, description = "Not the company owner", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_job(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let company_id = authz::require_job_owner(&mut conn, user_id, job_id)?;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(applications::table.filter(applications::job_id.eq(job_id)))
            .execute(conn)?;
        diesel::delete(jobs::table.filter(jobs::id.eq(job_id))).execute(conn)?;

        let _ = OutboxService::emit(
            conn,
            EventType::JobDeleted,
            AggregateType::Job,
            job_id,
            serde_json::json!({"company_id": company_id.to_string()}),
            Some(user_id),
            Some(company_id),
            None,
        );

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, "Failed to delete job");
        ApiError::internal("Failed to delete job", "DELETE_ERROR")
    })?;

    info!(job_id = %job_id, company_id = %company_id, "Job deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/jobs/{id}/apply",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = ApplyRequest,
    responses(
        (status = 200, description = "Application submitted", body = Application),
        (status = 400, description = "Job is closed or invalid CV URL", body = ErrorResponse),
        (status = 403, description = "Only regular users may apply", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Already applied", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn apply_to_job(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(job_id): Path<Uuid>,
    Json(payload): Json<ApplyRequest>,
) -> ApiResult<Json<Application>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if claims.is_admin() {
        return Err(ApiError::forbidden(
            "Only regular users may apply to jobs",
            "USER_ROLE_REQUIRED",
        ));
    }

    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let job = find_job(&mut conn, job_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Job not found", "JOB_NOT_FOUND"))?;

    // Rejected before any write.
    if job.closed {
        return Err(ApiError::bad_request(
            "Job is closed for applications",
            "JOB_CLOSED",
        ));
    }

    let application: Application = diesel::insert_into(applications::table)
        .values(&NewApplication {
            job_id,
            user_id,
            cv_url: payload.cv_url,
            status: ApplicationStatus::Pending.as_str().to_string(),
        })
        .get_result(&mut conn)
        .map_err(|e| {
            conflict_on_unique(e, "You have already applied to this job", "ALREADY_APPLIED")
        })?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::ApplicationSubmitted,
        AggregateType::Application,
        application.id,
        serde_json::to_value(ApplicationSubmittedPayload {
            job_id,
            company_id: job.company_id,
            applicant_id: user_id,
        })
        .unwrap_or_default(),
        Some(user_id),
        Some(job.company_id),
        None,
    );

    record_application_submitted();

    // Socket fan-out happens after the application row is committed.
    state
        .gateway
        .emit_new_application(job.company_id, job_id, application.id, user_id);

    info!(
        application_id = %application.id,
        job_id = %job_id,
        applicant_id = %user_id,
        "Application submitted"
    );

    Ok(Json(application))
}

#[utoipa::path(
    get,
    path = "/jobs/{id}/applications",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Job id"), PaginationParams),
    responses(
        (status = 200, description = "Paginated applications for the job", body = PaginatedResponse<Application>),
        (status = 403, description = "Not HR or owner of the company", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_job_applications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(job_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Application>>> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    find_job(&mut conn, job_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Job not found", "JOB_NOT_FOUND"))?;

    authz::require_hr_or_owner(&mut conn, user_id, CompanyRef::job(job_id))?;

    let total: i64 = applications::table
        .filter(applications::job_id.eq(job_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();

    let data: Vec<Application> = applications::table
        .filter(applications::job_id.eq(job_id))
        .order(applications::created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(Application::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Json(data.into_paginated(&pagination, total)))
}
