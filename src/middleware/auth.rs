//! Bearer token authentication for protected routes.
//!
//! A token passes when its signature verifies, its hash is not on the
//! revocation list, and it was issued after any whole-user revocation
//! cutoff. Verified claims land in the request extensions for handlers.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::jwt::Claims;
use crate::AppState;

fn reject(status: StatusCode, message: &str, code: &str) -> Response {
    (status, Json(json!({"error": message, "code": code}))).into_response()
}

fn bearer_token(req: &Request) -> Result<&str, Response> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            reject(
                StatusCode::UNAUTHORIZED,
                "Missing authorization header",
                "MISSING_AUTH_HEADER",
            )
        })?;

    header_value.strip_prefix("Bearer ").ok_or_else(|| {
        reject(
            StatusCode::UNAUTHORIZED,
            "Invalid authorization header format",
            "INVALID_AUTH_FORMAT",
        )
    })
}

async fn is_revoked(state: &AppState, token: &str, claims: &Claims) -> bool {
    if state
        .cache
        .token_revocation
        .is_token_revoked(&hash_token(token))
        .await
    {
        return true;
    }

    match Uuid::parse_str(&claims.sub) {
        Ok(user_id) => {
            state
                .cache
                .token_revocation
                .is_user_token_revoked(user_id, claims.iat)
                .await
        }
        Err(_) => false,
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = bearer_token(&req)?;

    let claims = state.jwt_config.verify_access_token(token).map_err(|_| {
        reject(
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token",
            "INVALID_TOKEN",
        )
    })?;

    if is_revoked(&state, token, &claims).await {
        return Err(reject(
            StatusCode::UNAUTHORIZED,
            "Token has been revoked",
            "TOKEN_REVOKED",
        ));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// SHA-256 of the raw token, used as the revocation list key.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Gate for the admin route group. Runs after `auth_middleware`, so the
/// claims extension is already present on any request that reaches it.
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, Response> {
    match req.extensions().get::<Claims>() {
        Some(claims) if claims.is_admin() => Ok(next.run(req).await),
        _ => Err(reject(
            StatusCode::FORBIDDEN,
            "Admin access required",
            "ADMIN_ONLY",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable_hex() {
        let hash = hash_token("some.jwt.token");
        assert_eq!(hash, hash_token("some.jwt.token"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_tokens_hash_differently() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }
}
