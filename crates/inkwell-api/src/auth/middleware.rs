//! Authentication gate for protected routes
//!
//! Requires `Authorization: Bearer <token>`, verifies the access token,
//! checks that a live session exists for it and attaches an [`Identity`] to
//! the request extensions. Role checks run afterwards via [`require_role`].

use super::jwt::TokenKind;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use inkwell_core::Role;
use std::sync::Arc;
use thiserror::Error;

/// Authenticated caller, scoped to a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: u64,
    pub role: Role,
    /// Token id of the access token used
    pub jti: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Session is not active")]
    SessionRevoked,

    #[error("Session store unavailable")]
    SessionStoreUnavailable,

    #[error("Insufficient permissions")]
    Forbidden,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AuthError::MissingAuthHeader => (
                StatusCode::UNAUTHORIZED,
                ApiError::unauthorized("Missing Authorization header"),
            ),
            AuthError::InvalidAuthHeader => (
                StatusCode::UNAUTHORIZED,
                ApiError::unauthorized("Invalid Authorization header format"),
            ),
            // Revoked and invalid look the same from outside
            AuthError::InvalidToken | AuthError::SessionRevoked => (
                StatusCode::UNAUTHORIZED,
                ApiError::unauthorized("Invalid or expired token"),
            ),
            AuthError::SessionStoreUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, ApiError::unavailable())
            }
            AuthError::Forbidden => (StatusCode::FORBIDDEN, ApiError::forbidden()),
        };

        (status, Json(error)).into_response()
    }
}

/// Extract the token from an `Authorization` value.
///
/// Exactly two space-separated parts, the first `Bearer`, the second non-empty.
pub fn parse_bearer(value: &str) -> Result<&str, AuthError> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::InvalidAuthHeader),
    }
}

/// Bearer token of a request, if well formed
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;
    parse_bearer(value)
}

/// Methods allowed through when the session store cannot be reached
fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Role policy check
pub fn authorize(identity: &Identity, required: Role) -> Result<(), AuthError> {
    if identity.role == required {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Authentication middleware
///
/// ```ignore
/// let protected = Router::new()
///     .route("/auth/me", get(me_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers())?;

    let claims = match state.tokens.verify_kind(token, TokenKind::Access) {
        Ok(claims) => claims,
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                reason: e.to_string(),
                ip_address: extract_ip_address(request.headers()),
                user_agent: extract_user_agent(request.headers()),
            });
            return Err(AuthError::InvalidToken);
        }
    };
    let subject_id = claims.subject_id().map_err(|_| AuthError::InvalidToken)?;

    match state.sessions.get(token).await {
        Ok(Some(owner)) if owner == subject_id => {}
        Ok(_) => {
            audit_log(&AuditEvent::InvalidToken {
                reason: "no active session".to_string(),
                ip_address: extract_ip_address(request.headers()),
                user_agent: extract_user_agent(request.headers()),
            });
            return Err(AuthError::SessionRevoked);
        }
        Err(e) if is_read_only(request.method()) => {
            tracing::warn!(
                error = %e,
                subject_id,
                method = %request.method(),
                "Session store unavailable, admitting read-only request on token alone"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, subject_id, "Session store unavailable, rejecting request");
            return Err(AuthError::SessionStoreUnavailable);
        }
    }

    request.extensions_mut().insert(Identity {
        subject_id,
        role: claims.role,
        jti: claims.jti,
    });

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}

type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>>;

/// Middleware factory for role-based access control
///
/// Must sit inside [`auth_middleware`]:
///
/// ```ignore
/// .route("/posts", post(create_post).route_layer(middleware::from_fn(require_role(Role::Author))))
/// ```
pub fn require_role(
    required: Role,
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| -> RoleMiddlewareFuture {
        Box::pin(async move {
            let identity = request
                .extensions()
                .get::<Identity>()
                .cloned()
                .ok_or(AuthError::MissingAuthHeader)?;

            if let Err(e) = authorize(&identity, required) {
                audit_log(&AuditEvent::AccessDenied {
                    user_id: identity.subject_id,
                    resource: format!("{} {}", request.method(), request.uri().path()),
                    required_role: required,
                    actual_role: identity.role,
                    ip_address: extract_ip_address(request.headers()),
                });
                return Err(e);
            }

            Ok(next.run(request).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");

        for bad in [
            "",
            "Bearer",
            "Bearer ",
            "bearer abc",
            "Basic abc",
            "Bearer  abc",
            "Bearer abc def",
            " Bearer abc",
            "Token abc",
        ] {
            assert!(
                matches!(parse_bearer(bad), Err(AuthError::InvalidAuthHeader)),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_bearer_token_missing_header() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingAuthHeader)
        ));
    }

    #[test]
    fn test_authorize() {
        let author = Identity {
            subject_id: 1,
            role: Role::Author,
            jti: "a".to_string(),
        };
        let user = Identity {
            role: Role::User,
            ..author.clone()
        };

        assert!(authorize(&author, Role::Author).is_ok());
        assert!(matches!(
            authorize(&user, Role::Author),
            Err(AuthError::Forbidden)
        ));
        assert!(authorize(&user, Role::User).is_ok());
    }

    #[test]
    fn test_read_only_methods() {
        assert!(is_read_only(&Method::GET));
        assert!(is_read_only(&Method::HEAD));
        assert!(is_read_only(&Method::OPTIONS));
        assert!(!is_read_only(&Method::POST));
        assert!(!is_read_only(&Method::DELETE));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::InvalidToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::SessionRevoked.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::SessionStoreUnavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn well_formed_headers_round_trip(token in "[A-Za-z0-9._-]{1,64}") {
                let header = format!("Bearer {token}");
                prop_assert_eq!(parse_bearer(&header).unwrap(), token.as_str());
            }

            #[test]
            fn other_schemes_rejected(scheme in "[A-Za-z]{1,10}", token in "[A-Za-z0-9]{1,16}") {
                prop_assume!(scheme != "Bearer");
                let header = format!("{scheme} {token}");
                prop_assert!(parse_bearer(&header).is_err());
            }
        }
    }
}
