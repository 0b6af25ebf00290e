//! OpenAPI document
//!
//! Served at `/api-docs/openapi.json`, browsable at `/swagger-ui`.

use crate::auth::{AuthResponse, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, UserInfo};
use crate::error::ApiError;
use crate::handlers::{auth, authors, health, notifications, posts};
use crate::posts::CreatePostRequest;
use inkwell_core::{BlogPost, Notification, Role};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness_check,
        auth::register_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::me_handler,
        authors::become_author,
        posts::create_post,
        posts::list_posts,
        posts::get_post,
        notifications::list_notifications,
    ),
    components(schemas(
        ApiError,
        Role,
        RegisterRequest,
        LoginRequest,
        RefreshRequest,
        LogoutRequest,
        AuthResponse,
        UserInfo,
        auth::LogoutResponse,
        authors::BecomeAuthorResponse,
        CreatePostRequest,
        BlogPost,
        Notification,
        health::HealthResponse,
        health::ReadinessResponse,
        health::ReadinessChecks,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and sessions"),
        (name = "authors", description = "Author promotion"),
        (name = "posts", description = "Blog posts"),
        (name = "notifications", description = "User notifications"),
        (name = "health", description = "Liveness and readiness"),
    )
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
                        .build(),
                ),
            );
        }
    }
}
