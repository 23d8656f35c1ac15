//! Shared error handling utilities.
//!
//! Every failure leaving the HTTP layer is an `ApiError` body paired with a
//! status code, so clients can branch on the machine-readable `code` field
//! without parsing the human message.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::DbPool;

pub type DbConn =
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    fn with_status(
        status: StatusCode,
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (status, Json(Self::new(error, code)))
    }

    pub fn bad_request(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::BAD_REQUEST, error, code)
    }

    pub fn unauthorized(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::UNAUTHORIZED, error, code)
    }

    pub fn forbidden(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::FORBIDDEN, error, code)
    }

    pub fn not_found(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::NOT_FOUND, error, code)
    }

    pub fn conflict(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::CONFLICT, error, code)
    }

    pub fn locked(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::LOCKED, error, code)
    }

    pub fn internal(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, error, code)
    }

    pub fn db_error() -> (StatusCode, Json<Self>) {
        Self::internal("Database error", "DB_ERROR")
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// Errors produced by services below the HTTP layer (authorization
/// resolution, chat, token issuance). Handlers convert these into
/// `ApiError` responses via the `From` impl.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("Database error")]
    Database(#[from] diesel::result::Error),
    #[error("Database connection error")]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl From<DomainError> for (StatusCode, Json<ApiError>) {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Unauthenticated => {
                ApiError::unauthorized("Authentication required", "UNAUTHORIZED")
            }
            DomainError::Forbidden(msg) => ApiError::forbidden(msg, "FORBIDDEN"),
            DomainError::NotFound(msg) => ApiError::not_found(msg, "NOT_FOUND"),
            DomainError::Conflict(msg) => ApiError::conflict(msg, "CONFLICT"),
            DomainError::Validation(msg) => ApiError::bad_request(msg, "VALIDATION_ERROR"),
            DomainError::Database(e) => {
                error!(error = %e, "Database error");
                ApiError::db_error()
            }
            DomainError::Pool(e) => {
                error!(error = %e, "Database connection error");
                ApiError::internal("Database connection error", "DB_CONNECTION_ERROR")
            }
        }
    }
}

/// Maps an insert failure to the given Conflict response when it is a
/// unique violation; anything else is a logged internal error.
pub fn conflict_on_unique(
    e: diesel::result::Error,
    message: &str,
    code: &str,
) -> (StatusCode, Json<ApiError>) {
    use diesel::result::{DatabaseErrorKind, Error};

    match e {
        Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ApiError::conflict(message, code)
        }
        other => {
            error!(error = %other, "Database error");
            ApiError::db_error()
        }
    }
}

pub fn get_db_conn(pool: &DbPool) -> Result<DbConn, (StatusCode, Json<ApiError>)> {
    pool.get().map_err(|e| {
        error!(error = %e, "Database connection error");
        ApiError::internal("Database connection error", "DB_CONNECTION_ERROR")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_pair_status_with_code() {
        let (status, body) = ApiError::not_found("No such job", "NOT_FOUND");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.0.code, "NOT_FOUND");
        assert_eq!(body.0.error, "No such job");

        let (status, _) = ApiError::db_error();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_only_unique_violations_become_conflicts() {
        use diesel::result::{DatabaseErrorKind, Error};

        let dup = Error::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key".to_string()),
        );
        let (status, body) = conflict_on_unique(dup, "Already applied", "ALREADY_APPLIED");
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.0.code, "ALREADY_APPLIED");

        let broken = Error::BrokenTransactionManager;
        let (status, body) = conflict_on_unique(broken, "Already applied", "ALREADY_APPLIED");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0.code, "DB_ERROR");
    }

    #[test]
    fn test_domain_errors_map_to_http_statuses() {
        let (status, body): (StatusCode, Json<ApiError>) =
            DomainError::Forbidden("Not your company".into()).into();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.0.error, "Not your company");

        let (status, body): (StatusCode, Json<ApiError>) = DomainError::Unauthenticated.into();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.0.code, "UNAUTHORIZED");

        let (status, _): (StatusCode, Json<ApiError>) =
            DomainError::Validation("Title is required".into()).into();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
