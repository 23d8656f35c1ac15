//! OpenAPI documentation configuration.
//!
//! This module provides the OpenAPI (Swagger) documentation for the Hireline API.
//! It uses `utoipa` to generate the OpenAPI specification and serves it via Swagger UI.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::auth::{
    AuthResponse, ConfirmOtpRequest, ErrorResponse, ForgotPasswordRequest, ForgotPasswordResponse,
    MessageResponse, RefreshRequest, RefreshResponse, ResetPasswordRequest, SigninRequest,
    SignupRequest, SignupResponse, UserResponse,
};
use crate::pagination::PaginationMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hireline API",
        version = "1.0.0",
        description = "Job board backend with company hiring workflows and realtime chat.\n\n\
        ## Features\n\
        - JWT Authentication with access and refresh tokens\n\
        - Email confirmation and password reset via one-time codes\n\
        - Companies with owner and HR staff roles\n\
        - Job postings and application pipelines\n\
        - Two-party chat with unread counters\n\
        - WebSocket gateway for realtime notifications\n\n\
        ## Authentication\n\
        Most endpoints require authentication via JWT bearer token.\n\
        1. Sign up, confirm the emailed code, then sign in to get an access token\n\
        2. Include the token in requests: `Authorization: Bearer <token>`\n\
        3. Use the refresh token to get new access tokens when expired",
        contact(
            name = "Hireline API Support"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Authentication", description = "User authentication and token management"),
        (name = "Users", description = "Profile management"),
        (name = "Companies", description = "Company and HR staff management"),
        (name = "Jobs", description = "Job postings and applications"),
        (name = "Applications", description = "Application pipeline management"),
        (name = "Chat", description = "Two-party conversations and messages"),
        (name = "Admin", description = "Moderation endpoints")
    ),
    paths(
        crate::handlers::health::health_check_simple,
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,

        crate::handlers::auth::signup,
        crate::handlers::auth::confirm_otp,
        crate::handlers::auth::signin,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,
        crate::handlers::auth::logout_all,
        crate::handlers::auth::forgot_password,
        crate::handlers::auth::reset_password,
        crate::handlers::auth::get_current_user,

        crate::handlers::users::get_profile,
        crate::handlers::users::update_profile,
        crate::handlers::users::delete_account,

        crate::handlers::companies::create_company,
        crate::handlers::companies::get_company,
        crate::handlers::companies::update_company,
        crate::handlers::companies::delete_company,
        crate::handlers::companies::add_hr,
        crate::handlers::companies::remove_hr,
        crate::handlers::companies::list_company_jobs,

        crate::handlers::jobs::create_job,
        crate::handlers::jobs::list_jobs,
        crate::handlers::jobs::get_job,
        crate::handlers::jobs::update_job,
        crate::handlers::jobs::delete_job,
        crate::handlers::jobs::apply_to_job,
        crate::handlers::jobs::list_job_applications,

        crate::handlers::applications::update_status,
        crate::handlers::applications::list_my_applications,

        crate::handlers::chat::send_message,
        crate::handlers::chat::get_history,
        crate::handlers::chat::list_conversations,
        crate::handlers::chat::unread_count,
        crate::handlers::chat::mark_read,
        crate::handlers::chat::delete_conversation,

        crate::handlers::admin::list_users,
        crate::handlers::admin::ban_user,
        crate::handlers::admin::unban_user,
        crate::handlers::admin::delete_user,
        crate::handlers::admin::approve_company,
        crate::handlers::admin::ban_company,
    ),
    components(
        schemas(
            SignupRequest,
            SignupResponse,
            ConfirmOtpRequest,
            SigninRequest,
            RefreshRequest,
            RefreshResponse,
            AuthResponse,
            UserResponse,
            MessageResponse,
            ErrorResponse,
            ForgotPasswordRequest,
            ForgotPasswordResponse,
            ResetPasswordRequest,

            PaginationMeta,

            crate::handlers::users::UpdateProfileRequest,

            crate::models::Company,
            crate::handlers::companies::CreateCompanyRequest,
            crate::handlers::companies::UpdateCompanyRequest,
            crate::handlers::companies::HrRequest,

            crate::models::Job,
            crate::handlers::jobs::CreateJobRequest,
            crate::handlers::jobs::UpdateJobRequest,
            crate::handlers::jobs::ApplyRequest,

            crate::models::Application,
            crate::handlers::applications::UpdateStatusRequest,

            crate::models::Conversation,
            crate::models::Message,
            crate::handlers::chat::SendMessageRequest,
            crate::handlers::chat::SendMessageResponse,
            crate::handlers::chat::ConversationSummary,
            crate::handlers::chat::UnreadCountResponse,
            crate::handlers::chat::MarkReadResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "JWT access token obtained from /auth/signin.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Hireline API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_has_security_scheme() {
        let spec = ApiDoc::openapi();
        assert!(spec.components.is_some());
        let components = spec.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn test_openapi_has_tags() {
        let spec = ApiDoc::openapi();
        assert!(spec.tags.is_some());
        let tags = spec.tags.unwrap();
        assert!(tags.iter().any(|t| t.name == "Authentication"));
        assert!(tags.iter().any(|t| t.name == "Chat"));
        assert!(tags.iter().any(|t| t.name == "Health"));
    }
}
