//! Admin panel handlers. Every route in this group sits behind the admin
//! middleware.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{error, info};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult},
    events::{outbox::OutboxService, AggregateType, EventType},
    handlers::auth::{ErrorResponse, UserResponse},
    helpers::get_user_id,
    models::{Company, User},
    pagination::{IntoPaginated, PaginatedResponse, PaginationParams},
    schema::{companies, refresh_tokens, users},
    AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserFilters {
    /// Case-insensitive substring match on the email.
    pub search: Option<String>,
}

async fn revoke_user_sessions(state: &AppState, conn: &mut PgConnection, user_id: Uuid) {
    diesel::delete(refresh_tokens::table.filter(refresh_tokens::user_id.eq(user_id)))
        .execute(conn)
        .ok();

    let access_token_ttl = state.jwt_config.access_token_expiry as u64;
    let _ = state
        .cache
        .token_revocation
        .revoke_all_user_tokens(user_id, access_token_ttl)
        .await;
}

#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "Admin",
    params(UserFilters, PaginationParams),
    responses(
        (status = 200, description = "Paginated user listing", body = PaginatedResponse<UserResponse>),
        (status = 403, description = "Admin access required", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(filters): Query<UserFilters>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<UserResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let apply_filters = |mut query: users::BoxedQuery<'static, diesel::pg::Pg>| -> users::BoxedQuery<'static, diesel::pg::Pg> {
        if let Some(search) = &filters.search {
            query = query.filter(users::email.ilike(format!("%{}%", search)));
        }
        query
    };

    let total: i64 = apply_filters(users::table.into_boxed())
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();

    let data: Vec<User> = apply_filters(users::table.into_boxed())
        .order(users::created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(User::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let data: Vec<UserResponse> = data.into_iter().map(Into::into).collect();
    Ok(Json(data.into_paginated(&pagination, total)))
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/ban",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User banned and sessions revoked"),
        (status = 403, description = "Admin access required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn ban_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let admin_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = diesel::update(
        users::table
            .filter(users::id.eq(user_id))
            .filter(users::deleted_at.is_null()),
    )
    .set(users::banned_at.eq(Utc::now().naive_utc()))
    .execute(&mut conn)
    .map_err(|e| {
        error!(error = %e, "Failed to ban user");
        ApiError::internal("Failed to ban user", "BAN_ERROR")
    })?;

    if updated == 0 {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    revoke_user_sessions(&state, &mut conn, user_id).await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::UserBanned,
        AggregateType::User,
        user_id,
        serde_json::json!({"banned_by": admin_id.to_string()}),
        Some(admin_id),
        None,
        None,
    );

    info!(user_id = %user_id, banned_by = %admin_id, "User banned");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/unban",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User unbanned"),
        (status = 403, description = "Admin access required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn unban_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let admin_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = diesel::update(
        users::table
            .filter(users::id.eq(user_id))
            .filter(users::deleted_at.is_null()),
    )
    .set(users::banned_at.eq(None::<chrono::NaiveDateTime>))
    .get_result(&mut conn)
    .optional()
    .map_err(|e| {
        error!(error = %e, "Failed to unban user");
        ApiError::internal("Failed to unban user", "UNBAN_ERROR")
    })?
    .ok_or_else(|| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    // A stale sign-in lockout should not outlive the ban.
    let _ = state.lockout.unlock_account(&user.email).await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::UserUnbanned,
        AggregateType::User,
        user_id,
        serde_json::json!({"unbanned_by": admin_id.to_string()}),
        Some(admin_id),
        None,
        None,
    );

    info!(user_id = %user_id, unbanned_by = %admin_id, "User unbanned");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User soft-deleted and sessions revoked"),
        (status = 403, description = "Admin access required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let admin_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = diesel::update(
        users::table
            .filter(users::id.eq(user_id))
            .filter(users::deleted_at.is_null()),
    )
    .set(users::deleted_at.eq(Utc::now().naive_utc()))
    .execute(&mut conn)
    .map_err(|e| {
        error!(error = %e, "Failed to delete user");
        ApiError::internal("Failed to delete user", "DELETE_ERROR")
    })?;

    if updated == 0 {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    revoke_user_sessions(&state, &mut conn, user_id).await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::AccountDeleted,
        AggregateType::User,
        user_id,
        serde_json::json!({"deleted_by": admin_id.to_string()}),
        Some(admin_id),
        None,
        None,
    );

    info!(user_id = %user_id, deleted_by = %admin_id, "User soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/admin/companies/{id}/approve",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "Company id")),
    responses(
        (status = 200, description = "Company approved", body = Company),
        (status = 403, description = "Admin access required", body = ErrorResponse),
        (status = 404, description = "Company not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn approve_company(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<Company>> {
    let admin_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let company: Company = diesel::update(
        companies::table
            .filter(companies::id.eq(company_id))
            .filter(companies::deleted_at.is_null()),
    )
    .set((
        companies::approved_by_admin.eq(true),
        companies::updated_at.eq(Utc::now().naive_utc()),
    ))
    .get_result(&mut conn)
    .optional()
    .map_err(|_| ApiError::db_error())?
    .ok_or_else(|| ApiError::not_found("Company not found", "COMPANY_NOT_FOUND"))?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::CompanyApproved,
        AggregateType::Company,
        company_id,
        serde_json::json!({"approved_by": admin_id.to_string()}),
        Some(admin_id),
        Some(company_id),
        None,
    );

    info!(company_id = %company_id, approved_by = %admin_id, "Company approved");
    Ok(Json(company))
}

#[utoipa::path(
    post,
    path = "/admin/companies/{id}/ban",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "Company id")),
    responses(
        (status = 200, description = "Company banned", body = Company),
        (status = 403, description = "Admin access required", body = ErrorResponse),
        (status = 404, description = "Company not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn ban_company(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<Company>> {
    let admin_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let company: Company = diesel::update(
        companies::table
            .filter(companies::id.eq(company_id))
            .filter(companies::deleted_at.is_null()),
    )
    .set((
        companies::banned_at.eq(Utc::now().naive_utc()),
        companies::updated_at.eq(Utc::now().naive_utc()),
    ))
    .get_result(&mut conn)
    .optional()
    .map_err(|_| ApiError::db_error())?
    .ok_or_else(|| ApiError::not_found("Company not found", "COMPANY_NOT_FOUND"))?;

    let _ = state.cache.membership_cache.invalidate_company(company_id).await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::CompanyBanned,
        AggregateType::Company,
        company_id,
        serde_json::json!({"banned_by": admin_id.to_string()}),
        Some(admin_id),
        Some(company_id),
        None,
    );

    info!(company_id = %company_id, banned_by = %admin_id, "Company banned");
    Ok(Json(company))
}
