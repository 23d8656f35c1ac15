//! Signup, email confirmation, sign-in, token refresh, and password reset.
//!
//! Refresh tokens are stored hashed in Postgres and rotated on use when
//! configured. One-time codes are returned in the response body; delivering
//! them by email is the calling backend's job.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{
        jwt::{Claims, JwtConfig},
        otp::{self, OtpPurpose},
        password::PasswordService,
    },
    error::{conflict_on_unique, get_db_conn, ApiError, ApiResult},
    events::{outbox::OutboxService, AggregateType, EventType, LoginFailedPayload, UserRegisteredPayload},
    middleware::auth::hash_token,
    models::{NewUser, Provider, Role, User},
    schema::{refresh_tokens, users},
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ana.kovac@hireline.dev")]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "s3cure-pa55word", min_length = 8)]
    pub password: String,
    #[validate(length(min = 1, message = "First name must not be empty"))]
    #[schema(example = "Ana")]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name must not be empty"))]
    #[schema(example = "Kovac")]
    pub last_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignupResponse {
    #[schema(example = "Account created. Confirm your email with the code we sent you.")]
    pub message: String,
    pub user: UserResponse,
    /// The email confirmation code. Your backend should deliver this to the
    /// user via email.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "483920")]
    pub confirmation_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ana.kovac@hireline.dev")]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    #[schema(example = "483920")]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SigninRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ana.kovac@hireline.dev")]
    pub email: String,
    #[schema(example = "s3cure-pa55word")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[schema(example = "eyJhbGciOiJFZERTQSJ9.eyJzdWIiOiI0ZjhhIn0...")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[schema(example = "eyJhbGciOiJFZERTQSJ9.eyJzdWIiOiI0ZjhhIn0...")]
    pub access_token: String,
    #[schema(example = "eyJhbGciOiJFZERTQSJ9.eyJzdWIiOiI0ZjhhIn0...")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    #[schema(example = "eyJhbGciOiJFZERTQSJ9.eyJzdWIiOiI0ZjhhIn0...")]
    pub access_token: String,
    #[schema(example = "eyJhbGciOiJFZERTQSJ9.eyJzdWIiOiI0ZjhhIn0...")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    #[schema(example = "4f8a2d1e-0c3b-4e5f-9a67-2b1d8c9e0f34")]
    pub id: Uuid,
    #[schema(example = "ana.kovac@hireline.dev")]
    pub email: String,
    #[schema(example = "Ana")]
    pub first_name: String,
    #[schema(example = "Kovac")]
    pub last_name: String,
    #[schema(example = "User")]
    pub role: String,
    #[schema(example = true)]
    pub is_confirmed: bool,
    pub created_at: chrono::NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            is_confirmed: user.is_confirmed,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Default)]
pub struct ErrorResponse {
    #[schema(example = "Invalid email or password")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "INVALID_CREDENTIALS")]
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Email confirmed")]
    pub message: String,
}

fn check_valid<T: Validate>(payload: &T) -> ApiResult<()> {
    payload.validate().map_err(|e| {
        ApiError::bad_request(format!("Validation error: {}", e), "VALIDATION_ERROR")
    })
}

fn check_password_policy(state: &AppState, password: &str) -> ApiResult<()> {
    state
        .password_policy
        .validate(password)
        .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))
}

fn hash_new_password(password: &str) -> ApiResult<String> {
    PasswordService::hash_password(password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
    })
}

fn ensure_active(user: &User) -> ApiResult<()> {
    if user.deleted_at.is_some() {
        return Err(ApiError::forbidden(
            "Account has been deleted",
            "ACCOUNT_DELETED",
        ));
    }
    if user.banned_at.is_some() {
        return Err(ApiError::forbidden(
            "Account has been banned",
            "ACCOUNT_BANNED",
        ));
    }
    Ok(())
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: chrono::NaiveDateTime,
}

fn store_refresh_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    token: &str,
    expires_in_secs: i64,
) -> Result<(), diesel::result::Error> {
    let token_hash = hash_token(token);
    let expires_at = (Utc::now() + Duration::seconds(expires_in_secs)).naive_utc();

    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            user_id,
            token_hash,
            expires_at,
        })
        .execute(conn)?;

    Ok(())
}

fn verify_stored_token(conn: &mut PgConnection, token: &str) -> Result<Uuid, &'static str> {
    let token_hash = hash_token(token);
    let now = Utc::now().naive_utc();

    let result: Result<(Uuid, chrono::NaiveDateTime), _> = refresh_tokens::table
        .filter(refresh_tokens::token_hash.eq(&token_hash))
        .select((refresh_tokens::user_id, refresh_tokens::expires_at))
        .first(conn);

    match result {
        Ok((user_id, expires_at)) => {
            if expires_at < now {
                let _ = diesel::delete(
                    refresh_tokens::table.filter(refresh_tokens::token_hash.eq(&token_hash)),
                )
                .execute(conn);
                Err("Refresh token has expired")
            } else {
                Ok(user_id)
            }
        }
        Err(_) => Err("Invalid refresh token"),
    }
}

fn invalidate_token(conn: &mut PgConnection, token: &str) -> Result<(), diesel::result::Error> {
    let token_hash = hash_token(token);
    diesel::delete(refresh_tokens::table.filter(refresh_tokens::token_hash.eq(&token_hash)))
        .execute(conn)?;
    Ok(())
}

fn cleanup_expired_tokens(conn: &mut PgConnection, user_id: Uuid) {
    let now = Utc::now().naive_utc();
    let result = diesel::delete(
        refresh_tokens::table
            .filter(refresh_tokens::user_id.eq(user_id))
            .filter(refresh_tokens::expires_at.lt(now)),
    )
    .execute(conn);

    if let Ok(count) = result {
        if count > 0 {
            info!(user_id = %user_id, deleted_count = count, "Cleaned up expired refresh tokens");
        }
    }
}

fn token_failure<E: std::fmt::Display>(e: E) -> (axum::http::StatusCode, Json<ApiError>) {
    error!(error = %e, "Token generation failed");
    ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
}

fn generate_tokens(
    jwt_config: &Arc<JwtConfig>,
    conn: &mut PgConnection,
    user: &User,
) -> ApiResult<(String, String)> {
    let access_token = jwt_config
        .generate_access_token(user.id, &user.email, &user.role)
        .map_err(token_failure)?;

    let refresh_token = jwt_config
        .generate_refresh_token(user.id)
        .map_err(token_failure)?;

    store_refresh_token(conn, user.id, &refresh_token, jwt_config.refresh_token_expiry).map_err(
        |e| {
            error!(error = %e, "Failed to store refresh token");
            ApiError::internal("Token storage failed", "TOKEN_STORAGE_ERROR")
        },
    )?;

    Ok((access_token, refresh_token))
}

fn find_live_user_by_email(
    conn: &mut PgConnection,
    email: &str,
) -> Result<Option<User>, diesel::result::Error> {
    users::table
        .filter(users::email.eq(email.to_lowercase()))
        .select(User::as_select())
        .first(conn)
        .optional()
}

#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "Authentication",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created, confirmation pending", body = SignupResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> ApiResult<Json<SignupResponse>> {
    check_valid(&payload)?;

    check_password_policy(&state, &payload.password)?;

    let password_hash = hash_new_password(&payload.password)?;

    let new_user = NewUser {
        email: payload.email.to_lowercase(),
        password_hash,
        first_name: payload.first_name,
        last_name: payload.last_name,
        role: Role::User.as_str().to_string(),
        provider: Provider::System.as_str().to_string(),
    };

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)
        .map_err(|e| conflict_on_unique(e, "User with this email already exists", "USER_EXISTS"))?;

    let code = otp::issue_code(
        &mut conn,
        user.id,
        OtpPurpose::ConfirmEmail,
        state.otp_expiry_mins,
    )
    .map_err(|e| {
        error!(error = %e, user_id = %user.id, "Failed to issue confirmation code");
        ApiError::internal("Failed to issue confirmation code", "OTP_ISSUE_ERROR")
    })?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::UserRegistered,
        AggregateType::User,
        user.id,
        serde_json::to_value(UserRegisteredPayload {
            email: user.email.clone(),
        })
        .unwrap_or_default(),
        Some(user.id),
        None,
        None,
    );

    info!(user_id = %user.id, email = %user.email, "User signed up, confirmation pending");

    Ok(Json(SignupResponse {
        message: "Account created. Confirm your email with the code we sent you.".to_string(),
        user: user.into(),
        confirmation_code: Some(code),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/confirm-otp",
    tag = "Authentication",
    request_body = ConfirmOtpRequest,
    responses(
        (status = 200, description = "Email confirmed", body = MessageResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn confirm_otp(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmOtpRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check_valid(&payload)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user = find_live_user_by_email(&mut conn, &payload.email)
        .map_err(|_| ApiError::db_error())?
        .filter(|u| u.deleted_at.is_none())
        .ok_or_else(|| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    if user.is_confirmed {
        return Ok(Json(MessageResponse {
            message: "Email already confirmed".to_string(),
        }));
    }

    let valid = otp::consume_code(&mut conn, user.id, OtpPurpose::ConfirmEmail, &payload.code)
        .map_err(|_| ApiError::db_error())?;

    if !valid {
        warn!(user_id = %user.id, "Invalid email confirmation attempt");
        return Err(ApiError::bad_request(
            "Invalid or expired code",
            "INVALID_OTP",
        ));
    }

    diesel::update(users::table.filter(users::id.eq(user.id)))
        .set((
            users::is_confirmed.eq(true),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::EmailConfirmed,
        AggregateType::User,
        user.id,
        serde_json::json!({"email": user.email}),
        Some(user.id),
        None,
        None,
    );

    info!(user_id = %user.id, "Email confirmed");

    Ok(Json(MessageResponse {
        message: "Email confirmed".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/signin",
    tag = "Authentication",
    request_body = SigninRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account deleted, banned, or unconfirmed", body = ErrorResponse),
        (status = 423, description = "Account locked", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<SigninRequest>,
) -> ApiResult<Json<AuthResponse>> {
    check_valid(&payload)?;

    if state.lockout.is_locked(&payload.email).await {
        let remaining = state
            .lockout
            .get_lockout_remaining(&payload.email)
            .await
            .unwrap_or(0);
        warn!(email = %payload.email, "Sign-in attempt for locked account");
        record_auth_attempt("signin", AuthOutcome::AccountLocked);
        return Err(ApiError::locked(
            format!("Account is locked. Try again in {} seconds", remaining),
            "ACCOUNT_LOCKED",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let user = find_live_user_by_email(&mut conn, &payload.email)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| {
            warn!(email = %payload.email, "Sign-in attempt for unknown email");
            ApiError::unauthorized("Invalid email or password", "INVALID_CREDENTIALS")
        })?;

    if let Err(e) = ensure_active(&user) {
        warn!(user_id = %user.id, "Sign-in attempt for inactive account");
        record_auth_attempt("signin", AuthOutcome::AccountInactive);
        return Err(e);
    }

    if user.provider != Provider::System.as_str() {
        return Err(ApiError::forbidden(
            "This account uses an external sign-in provider",
            "EXTERNAL_PROVIDER",
        ));
    }

    let is_valid = PasswordService::verify_password(&payload.password, &user.password_hash)
        .map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
        })?;

    if !is_valid {
        warn!(user_id = %user.id, "Failed sign-in attempt - invalid password");
        record_auth_attempt("signin", AuthOutcome::InvalidCredentials);
        let _ = state.lockout.record_failed_attempt(&payload.email).await;

        let _ = OutboxService::emit(
            &mut conn,
            EventType::LoginFailed,
            AggregateType::User,
            user.id,
            serde_json::to_value(LoginFailedPayload {
                email: payload.email.clone(),
                reason: "invalid_password".to_string(),
            })
            .unwrap_or_default(),
            Some(user.id),
            None,
            None,
        );

        return Err(ApiError::unauthorized(
            "Invalid email or password",
            "INVALID_CREDENTIALS",
        ));
    }

    if !user.is_confirmed {
        return Err(ApiError::forbidden(
            "Email is not confirmed",
            "EMAIL_NOT_CONFIRMED",
        ));
    }

    let _ = state.lockout.clear_failed_attempts(&payload.email).await;

    cleanup_expired_tokens(&mut conn, user.id);

    let (access_token, refresh_token) = generate_tokens(&state.jwt_config, &mut conn, &user)?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::LoginSuccess,
        AggregateType::User,
        user.id,
        serde_json::json!({"email": user.email}),
        Some(user.id),
        None,
        None,
    );

    record_auth_attempt("signin", AuthOutcome::Success);
    info!(user_id = %user.id, email = %user.email, "User signed in");

    Ok(Json(AuthResponse {
        user: user.into(),
        access_token,
        refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = RefreshResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse),
        (status = 403, description = "Account deleted or banned", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let refresh_claims = state
        .jwt_config
        .verify_refresh_token(&payload.refresh_token)
        .map_err(|_| {
            ApiError::unauthorized("Invalid or expired refresh token", "INVALID_REFRESH_TOKEN")
        })?;

    let user_id = Uuid::parse_str(&refresh_claims.sub).map_err(|e| {
        error!(error = %e, "Invalid user ID in refresh token");
        ApiError::bad_request("Invalid token format", "INVALID_TOKEN_FORMAT")
    })?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let stored_user_id = verify_stored_token(&mut conn, &payload.refresh_token).map_err(|msg| {
        warn!(user_id = %user_id, "Refresh token not found in database");
        ApiError::unauthorized(msg, "INVALID_REFRESH_TOKEN")
    })?;

    if stored_user_id != user_id {
        warn!(claimed_user_id = %user_id, stored_user_id = %stored_user_id, "Refresh token user mismatch");
        return Err(ApiError::unauthorized(
            "Invalid refresh token",
            "TOKEN_USER_MISMATCH",
        ));
    }

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .select(User::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::unauthorized("User not found", "USER_NOT_FOUND"))?;

    ensure_active(&user)?;

    if state.rotate_refresh_tokens {
        invalidate_token(&mut conn, &payload.refresh_token).map_err(|e| {
            error!(error = %e, "Failed to invalidate old refresh token");
            ApiError::internal("Token invalidation failed", "TOKEN_INVALIDATION_ERROR")
        })?;

        let (access_token, refresh_token) = generate_tokens(&state.jwt_config, &mut conn, &user)?;

        info!(user_id = %user.id, "Tokens refreshed (rotated)");

        Ok(Json(RefreshResponse {
            access_token,
            refresh_token,
        }))
    } else {
        let access_token = state
            .jwt_config
            .generate_access_token(user.id, &user.email, &user.role)
            .map_err(token_failure)?;

        info!(user_id = %user.id, "Access token refreshed");

        Ok(Json(RefreshResponse {
            access_token,
            refresh_token: payload.refresh_token,
        }))
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Logged out"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let _ = invalidate_token(&mut conn, &payload.refresh_token);
    info!("User logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/logout-all",
    tag = "Authentication",
    responses(
        (status = 204, description = "Logged out from all devices"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let user_id = crate::helpers::get_user_id(&claims)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted_count =
        diesel::delete(refresh_tokens::table.filter(refresh_tokens::user_id.eq(user_id)))
            .execute(&mut conn)
            .map_err(|e| {
                error!(error = %e, "Failed to delete refresh tokens");
                ApiError::internal("Failed to logout", "LOGOUT_ERROR")
            })?;

    let access_token_ttl = state.jwt_config.access_token_expiry as u64;
    let _ = state
        .cache
        .token_revocation
        .revoke_all_user_tokens(user_id, access_token_ttl)
        .await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::LogoutCompleted,
        AggregateType::User,
        user_id,
        serde_json::json!({"all_devices": true}),
        Some(user_id),
        None,
        None,
    );

    info!(user_id = %user_id, tokens_deleted = deleted_count, "User logged out from all devices");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ana.kovac@hireline.dev")]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForgotPasswordResponse {
    #[schema(example = "Password reset code created")]
    pub message: String,
    /// The reset code. Your backend should deliver this to the user via
    /// email. Null if no active account exists for the email.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "483920")]
    pub reset_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ana.kovac@hireline.dev")]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    #[schema(example = "483920")]
    pub code: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "br4nd-new-pa55word", min_length = 8)]
    pub password: String,
}

/// Request a password reset code.
/// In development mode, returns the code directly.
/// In production, the code should be sent via email (not implemented).
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "Authentication",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset initiated", body = ForgotPasswordResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<ForgotPasswordResponse>> {
    check_valid(&payload)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user = find_live_user_by_email(&mut conn, &payload.email)
        .map_err(|_| ApiError::db_error())?
        .filter(|u| u.deleted_at.is_none() && u.banned_at.is_none());

    let Some(user) = user else {
        return Ok(Json(ForgotPasswordResponse {
            message: "No active account found".to_string(),
            reset_code: None,
        }));
    };

    if user.provider != Provider::System.as_str() {
        return Ok(Json(ForgotPasswordResponse {
            message: "No active account found".to_string(),
            reset_code: None,
        }));
    }

    let code = otp::issue_code(
        &mut conn,
        user.id,
        OtpPurpose::ResetPassword,
        state.otp_expiry_mins,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to create password reset code");
        ApiError::internal("Failed to initiate password reset", "RESET_CODE_ERROR")
    })?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::PasswordResetRequested,
        AggregateType::User,
        user.id,
        serde_json::json!({"email": user.email}),
        Some(user.id),
        None,
        None,
    );

    info!(user_id = %user.id, "Password reset requested");

    Ok(Json(ForgotPasswordResponse {
        message: "Password reset code created".to_string(),
        reset_code: Some(code),
    }))
}

/// Reset password using a one-time code.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "Authentication",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset successful", body = MessageResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check_valid(&payload)?;

    check_password_policy(&state, &payload.password)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user = find_live_user_by_email(&mut conn, &payload.email)
        .map_err(|_| ApiError::db_error())?
        .filter(|u| u.deleted_at.is_none())
        .ok_or_else(|| ApiError::bad_request("Invalid or expired code", "INVALID_RESET_CODE"))?;

    let valid = otp::consume_code(&mut conn, user.id, OtpPurpose::ResetPassword, &payload.code)
        .map_err(|_| ApiError::db_error())?;

    if !valid {
        warn!(user_id = %user.id, "Invalid password reset attempt");
        return Err(ApiError::bad_request(
            "Invalid or expired code",
            "INVALID_RESET_CODE",
        ));
    }

    let password_hash = hash_new_password(&payload.password)?;

    let now = Utc::now().naive_utc();

    diesel::update(users::table.filter(users::id.eq(user.id)))
        .set((
            users::password_hash.eq(password_hash),
            users::credential_changed_at.eq(now),
            users::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to update password");
            ApiError::internal("Failed to reset password", "PASSWORD_UPDATE_ERROR")
        })?;

    diesel::delete(refresh_tokens::table.filter(refresh_tokens::user_id.eq(user.id)))
        .execute(&mut conn)
        .ok();

    let access_token_ttl = state.jwt_config.access_token_expiry as u64;
    let _ = state
        .cache
        .token_revocation
        .revoke_all_user_tokens(user.id, access_token_ttl)
        .await;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::PasswordResetCompleted,
        AggregateType::User,
        user.id,
        serde_json::json!({"email": user.email}),
        Some(user.id),
        None,
        None,
    );

    info!(user_id = %user.id, "Password reset completed");

    Ok(Json(MessageResponse {
        message: "Password has been reset".to_string(),
    }))
}

/// Returns the currently authenticated user's information.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user information", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = crate::helpers::get_user_id(&claims)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .filter(users::deleted_at.is_null())
        .select(User::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    Ok(Json(user.into()))
}
