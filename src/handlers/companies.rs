//! Company management handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::jwt::Claims,
    authz,
    error::{conflict_on_unique, get_db_conn, ApiError, ApiResult},
    events::{outbox::OutboxService, AggregateType, EventType},
    handlers::auth::ErrorResponse,
    helpers::get_user_id,
    models::{Company, Job, NewCompany, NewCompanyHr, User},
    pagination::{IntoPaginated, PaginatedResponse, PaginationParams},
    schema::{companies, company_hrs, jobs, users},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCompanyRequest {
    #[validate(length(min = 2, message = "Company name must be at least 2 characters"))]
    #[schema(example = "Acme Corp")]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "hr@acme.example")]
    pub email: String,
    #[schema(example = "We make everything")]
    pub description: Option<String>,
    #[schema(example = "Manufacturing")]
    pub industry: Option<String>,
    #[schema(example = "https://acme.example")]
    pub website: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 2, message = "Company name must be at least 2 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HrRequest {
    #[schema(example = "4f8a2d1e-0c3b-4e5f-9a67-2b1d8c9e0f34")]
    pub user_id: Uuid,
}

fn find_live_company(
    conn: &mut PgConnection,
    company_id: Uuid,
) -> Result<Option<Company>, diesel::result::Error> {
    companies::table
        .filter(companies::id.eq(company_id))
        .filter(companies::deleted_at.is_null())
        .select(Company::as_select())
        .first(conn)
        .optional()
}

#[utoipa::path(
    post,
    path = "/companies",
    tag = "Companies",
    request_body = CreateCompanyRequest,
    responses(
        (status = 200, description = "Company created, pending admin approval", body = Company),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 409, description = "Company name or email already taken", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_company(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCompanyRequest>,
) -> ApiResult<Json<Company>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let new_company = NewCompany {
        name: payload.name,
        email: payload.email.to_lowercase(),
        description: payload.description,
        industry: payload.industry,
        website: payload.website,
        created_by: user_id,
    };

    let company: Company = diesel::insert_into(companies::table)
        .values(&new_company)
        .get_result(&mut conn)
        .map_err(|e| {
            conflict_on_unique(
                e,
                "A company with this name or email already exists",
                "COMPANY_EXISTS",
            )
        })?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::CompanyCreated,
        AggregateType::Company,
        company.id,
        serde_json::json!({"name": company.name, "created_by": user_id.to_string()}),
        Some(user_id),
        Some(company.id),
        None,
    );

    info!(company_id = %company.id, owner_id = %user_id, "Company created");
    Ok(Json(company))
}

#[utoipa::path(
    get,
    path = "/companies/{id}",
    tag = "Companies",
    params(("id" = Uuid, Path, description = "Company id")),
    responses(
        (status = 200, description = "Company details", body = Company),
        (status = 404, description = "Company not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<Company>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let company = find_live_company(&mut conn, company_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Company not found", "COMPANY_NOT_FOUND"))?;

    Ok(Json(company))
}

#[utoipa::path(
    patch,
    path = "/companies/{id}",
    tag = "Companies",
    params(("id" = Uuid, Path, description = "Company id")),
    request_body = UpdateCompanyRequest,
    responses(
        (status = 200, description = "Company updated", body = Company),
        (status = 403, description = "Not the company owner", body = ErrorResponse),
        (status = 404, description = "Company not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_company(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(company_id): Path<Uuid>,
    Json(payload): Json<UpdateCompanyRequest>,
) -> ApiResult<Json<Company>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let mut company = find_live_company(&mut conn, company_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Company not found", "COMPANY_NOT_FOUND"))?;

    if !authz::is_company_owner(&mut conn, user_id, company_id).map_err(|_| ApiError::db_error())? {
        return Err(ApiError::forbidden(
            "Only the company owner may update the company",
            "NOT_COMPANY_OWNER",
        ));
    }

    if let Some(name) = payload.name {
        company.name = name;
    }
    if let Some(email) = payload.email {
        company.email = email.to_lowercase();
    }
    if payload.description.is_some() {
        company.description = payload.description;
    }
    if payload.industry.is_some() {
        company.industry = payload.industry;
    }
    if payload.website.is_some() {
        company.website = payload.website;
    }

    let updated: Company = diesel::update(companies::table.filter(companies::id.eq(company_id)))
        .set((
            companies::name.eq(&company.name),
            companies::email.eq(&company.email),
            companies::description.eq(&company.description),
            companies::industry.eq(&company.industry),
            companies::website.eq(&company.website),
            companies::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, company_id = %company_id, "Failed to update company");
            ApiError::conflict(
                "A company with this name or email already exists",
                "COMPANY_EXISTS",
            )
        })?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::CompanyUpdated,
        AggregateType::Company,
        company_id,
        serde_json::json!({"name": updated.name}),
        Some(user_id),
        Some(company_id),
        None,
    );

    info!(company_id = %company_id, "Company updated");
    Ok(Json(updated))
}

/// Soft-deletes a company. Allowed for the owner or an admin.
#[utoipa::path(
    delete,
    path = "/companies/{id}",
    tag = "Companies",
    params(("id" = Uuid, Path, description = "Company id")),
    responses(
        (status = 204, description = "Company deleted"),
        (status = 403, description = "Not the company owner or an admin", body = ErrorResponse),
        (status = 404, description = "Company not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_company(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    find_live_company(&mut conn, company_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Company not found", "COMPANY_NOT_FOUND"))?;

    let is_owner =
        authz::is_company_owner(&mut conn, user_id, company_id).map_err(|_| ApiError::db_error())?;

    if !claims.is_admin() && !is_owner {
        return Err(ApiError::forbidden(
            "Only the company owner or an admin may delete the company",
            "NOT_COMPANY_OWNER",
        ));
    }

    diesel::update(companies::table.filter(companies::id.eq(company_id)))
        .set(companies::deleted_at.eq(Utc::now().naive_utc()))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to delete company");
            ApiError::internal("Failed to delete company", "DELETE_ERROR")
        })?;

    let _ = state.cache.membership_cache.invalidate_company(company_id).await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::CompanyDeleted,
        AggregateType::Company,
        company_id,
        serde_json::json!({"deleted_by": user_id.to_string()}),
        Some(user_id),
        Some(company_id),
        None,
    );

    info!(company_id = %company_id, deleted_by = %user_id, "Company soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/companies/{id}/hrs",
    tag = "Companies",
    params(("id" = Uuid, Path, description = "Company id")),
    request_body = HrRequest,
    responses(
        (status = 204, description = "HR added"),
        (status = 403, description = "Not the company owner", body = ErrorResponse),
        (status = 404, description = "Company or user not found", body = ErrorResponse),
        (status = 409, description = "User is already HR", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_hr(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(company_id): Path<Uuid>,
    Json(payload): Json<HrRequest>,
) -> ApiResult<StatusCode> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    find_live_company(&mut conn, company_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Company not found", "COMPANY_NOT_FOUND"))?;

    if !authz::is_company_owner(&mut conn, user_id, company_id).map_err(|_| ApiError::db_error())? {
        return Err(ApiError::forbidden(
            "Only the company owner may manage HRs",
            "NOT_COMPANY_OWNER",
        ));
    }

    let target: Option<User> = users::table
        .filter(users::id.eq(payload.user_id))
        .filter(users::deleted_at.is_null())
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|_| ApiError::db_error())?;

    if target.is_none() {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    diesel::insert_into(company_hrs::table)
        .values(&NewCompanyHr {
            company_id,
            user_id: payload.user_id,
        })
        .execute(&mut conn)
        .map_err(|_| ApiError::conflict("User is already HR of this company", "ALREADY_HR"))?;

    let _ = state
        .cache
        .membership_cache
        .invalidate(payload.user_id, company_id)
        .await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::HrAdded,
        AggregateType::Company,
        company_id,
        serde_json::json!({"hr_user_id": payload.user_id.to_string()}),
        Some(user_id),
        Some(company_id),
        None,
    );

    info!(company_id = %company_id, hr_user_id = %payload.user_id, "HR added");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/companies/{id}/hrs/{user_id}",
    tag = "Companies",
    params(
        ("id" = Uuid, Path, description = "Company id"),
        ("user_id" = Uuid, Path, description = "HR user id")
    ),
    responses(
        (status = 204, description = "HR removed"),
        (status = 403, description = "Not the company owner", body = ErrorResponse),
        (status = 404, description = "Company not found or user is not HR", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_hr(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((company_id, hr_user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    find_live_company(&mut conn, company_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Company not found", "COMPANY_NOT_FOUND"))?;

    if !authz::is_company_owner(&mut conn, user_id, company_id).map_err(|_| ApiError::db_error())? {
        return Err(ApiError::forbidden(
            "Only the company owner may manage HRs",
            "NOT_COMPANY_OWNER",
        ));
    }

    let removed = diesel::delete(
        company_hrs::table
            .filter(company_hrs::company_id.eq(company_id))
            .filter(company_hrs::user_id.eq(hr_user_id)),
    )
    .execute(&mut conn)
    .map_err(|_| ApiError::db_error())?;

    if removed == 0 {
        return Err(ApiError::not_found(
            "User is not HR of this company",
            "NOT_HR",
        ));
    }

    let _ = state
        .cache
        .membership_cache
        .invalidate(hr_user_id, company_id)
        .await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::HrRemoved,
        AggregateType::Company,
        company_id,
        serde_json::json!({"hr_user_id": hr_user_id.to_string()}),
        Some(user_id),
        Some(company_id),
        None,
    );

    info!(company_id = %company_id, hr_user_id = %hr_user_id, "HR removed");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/companies/{id}/jobs",
    tag = "Companies",
    params(("id" = Uuid, Path, description = "Company id"), PaginationParams),
    responses(
        (status = 200, description = "Paginated jobs for the company", body = PaginatedResponse<Job>),
        (status = 404, description = "Company not found", body = ErrorResponse)
    )
)]
pub async fn list_company_jobs(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Job>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    find_live_company(&mut conn, company_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Company not found", "COMPANY_NOT_FOUND"))?;

    let total: i64 = jobs::table
        .filter(jobs::company_id.eq(company_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();

    let data: Vec<Job> = jobs::table
        .filter(jobs::company_id.eq(company_id))
        .order(jobs::created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(Job::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Json(data.into_paginated(&pagination, total)))
}
