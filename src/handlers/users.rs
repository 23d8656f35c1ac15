//! Profile handlers for the authenticated user.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{error, info};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult},
    events::{outbox::OutboxService, AggregateType, EventType},
    handlers::auth::{ErrorResponse, UserResponse},
    helpers::get_user_id,
    models::User,
    schema::{refresh_tokens, users},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, message = "First name must not be empty"))]
    #[schema(example = "Jane")]
    pub first_name: Option<String>,
    #[validate(length(min = 1, message = "Last name must not be empty"))]
    #[schema(example = "Doe")]
    pub last_name: Option<String>,
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Current user profile", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .filter(users::deleted_at.is_null())
        .select(User::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    Ok(Json(user.into()))
}

#[utoipa::path(
    patch,
    path = "/users/me",
    tag = "Users",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let mut user: User = users::table
        .filter(users::id.eq(user_id))
        .filter(users::deleted_at.is_null())
        .select(User::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    if let Some(first_name) = payload.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = payload.last_name {
        user.last_name = last_name;
    }

    let updated: User = diesel::update(users::table.filter(users::id.eq(user_id)))
        .set((
            users::first_name.eq(&user.first_name),
            users::last_name.eq(&user.last_name),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to update profile");
            ApiError::internal("Failed to update profile", "UPDATE_ERROR")
        })?;

    info!(user_id = %user_id, "Profile updated");
    Ok(Json(updated.into()))
}

/// Soft-deletes the authenticated user's account and revokes every
/// outstanding token.
#[utoipa::path(
    delete,
    path = "/users/me",
    tag = "Users",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = diesel::update(
        users::table
            .filter(users::id.eq(user_id))
            .filter(users::deleted_at.is_null()),
    )
    .set(users::deleted_at.eq(Utc::now().naive_utc()))
    .execute(&mut conn)
    .map_err(|e| {
        error!(error = %e, "Failed to delete account");
        ApiError::internal("Failed to delete account", "DELETE_ERROR")
    })?;

    if updated == 0 {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    diesel::delete(refresh_tokens::table.filter(refresh_tokens::user_id.eq(user_id)))
        .execute(&mut conn)
        .ok();

    let access_token_ttl = state.jwt_config.access_token_expiry as u64;
    let _ = state
        .cache
        .token_revocation
        .revoke_all_user_tokens(user_id, access_token_ttl)
        .await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::AccountDeleted,
        AggregateType::User,
        user_id,
        serde_json::json!({"user_id": user_id.to_string()}),
        Some(user_id),
        None,
        None,
    );

    info!(user_id = %user_id, "Account soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}
