//! Shared helper functions for handlers.

use axum::{http::StatusCode, Json};
use uuid::Uuid;

use crate::auth::jwt::Claims;
use crate::error::ApiError;

pub fn get_user_id(claims: &Claims) -> Result<Uuid, (StatusCode, Json<ApiError>)> {
    claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid token subject", "INVALID_TOKEN"))
}
