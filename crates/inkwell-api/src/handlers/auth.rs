//! Authentication API handlers
//!
//! Author: hephaex@gmail.com

use crate::auth::{
    bearer_token, AuthResponse, ClientContext, Identity, LoginRequest, LogoutRequest,
    RefreshRequest, RegisterRequest, UserInfo,
};
use crate::error::{AppError, JsonBody};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

/// Register a new user account
///
/// New users get role `USER`.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserInfo),
        (status = 400, description = "Invalid email or empty password", body = crate::error::ApiError),
        (status = 409, description = "Email already registered", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth
        .register(request, &ClientContext::from_headers(&headers))
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Login with email and password
///
/// Returns an access/refresh token pair. Unknown email and wrong password
/// produce the same 401.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 503, description = "Session store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .auth
        .login(request, &ClientContext::from_headers(&headers))
        .await?;

    Ok(Json(response))
}

/// Exchange a refresh token for a new access token
///
/// The new token carries the user's current role.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = AuthResponse),
        (status = 401, description = "Invalid or revoked refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .auth
        .refresh(request, &ClientContext::from_headers(&headers))
        .await?;

    Ok(Json(response))
}

/// Logout current session
///
/// Revokes the access token used for this request and, optionally, a
/// refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body(content = LogoutRequest, description = "Logout options (optional)"),
    responses(
        (status = 200, description = "Logout successful", body = LogoutResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 503, description = "Session store unavailable", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    headers: HeaderMap,
    request: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let token = bearer_token(&headers)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
    let request = request.map(|Json(r)| r).unwrap_or_default();

    state
        .auth
        .logout(
            identity.subject_id,
            token,
            request,
            &ClientContext::from_headers(&headers),
        )
        .await?;

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user profile", body = UserInfo),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth.get_user(identity.subject_id).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logout_response_serialization() {
        let response = LogoutResponse {
            message: "Logged out".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("Logged out"));
    }

    #[test]
    fn test_auth_response_omits_missing_refresh_token() {
        let response = AuthResponse {
            access_token: "a".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_in: 900,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("refresh_token").is_none());
        assert_eq!(json["expires_in"], 900);
    }
}
