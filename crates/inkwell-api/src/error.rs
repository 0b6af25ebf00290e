//! API error handling
//!
//! Every failure leaves the server as `{code, message}`. Internal details are
//! logged here and never returned to the client.
//!
//! Author: hephaex@gmail.com

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use inkwell_core::InkwellError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", "Access denied")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn unavailable() -> Self {
        Self::new("SERVICE_UNAVAILABLE", "Service temporarily unavailable")
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// Message is shown to the client; keep it generic
    Unauthorized(String),
    Forbidden,
    Conflict(String),
    /// Dependency down or timed out; detail is logged only
    ServiceUnavailable(String),
    Internal(String),
    Database(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(what) => write!(f, "{what} not found"),
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Conflict(msg) => f.write_str(msg),
            AppError::Forbidden => f.write_str("forbidden"),
            AppError::ServiceUnavailable(msg) => write!(f, "unavailable: {msg}"),
            AppError::Internal(msg) => write!(f, "internal: {msg}"),
            AppError::Database(msg) => write!(f, "database: {msg}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::NotFound(what) => ApiError::not_found(&what),
            AppError::BadRequest(msg) => ApiError::bad_request(msg),
            AppError::Unauthorized(msg) => ApiError::unauthorized(msg),
            AppError::Forbidden => ApiError::forbidden(),
            AppError::Conflict(msg) => ApiError::conflict(msg),
            AppError::ServiceUnavailable(detail) => {
                tracing::warn!(detail = %detail, "Dependency unavailable");
                ApiError::unavailable()
            }
            AppError::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error");
                ApiError::internal_error()
            }
            AppError::Database(detail) => {
                tracing::error!(detail = %detail, "Database error");
                ApiError::new("DATABASE_ERROR", "Database operation failed")
            }
        };

        (status, Json(error)).into_response()
    }
}

/// JSON request body whose rejection is an [`AppError`]
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected request body");
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                "Expected Content-Type: application/json"
            }
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::JsonDataError(_) => "Request body is missing or has invalid fields",
            _ => "Invalid request body",
        };
        AppError::BadRequest(message.to_string())
    }
}

/// Error handler for the request deadline layer
pub async fn handle_timeout(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::ServiceUnavailable("request deadline exceeded".to_string())
    } else {
        AppError::Internal(format!("middleware error: {err}"))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<InkwellError> for AppError {
    fn from(err: InkwellError) -> Self {
        match err {
            InkwellError::NotFound(what) => AppError::NotFound(what),
            InkwellError::Conflict(msg) => AppError::Conflict(msg),
            InkwellError::ValidationError(msg) => AppError::BadRequest(msg),
            InkwellError::DatabaseError(msg) => AppError::Database(msg),
            InkwellError::Unavailable(what) => AppError::ServiceUnavailable(what),
            InkwellError::ConfigError(msg) => {
                AppError::Internal(format!("Configuration error: {msg}"))
            }
            InkwellError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        let cases = [
            (InkwellError::NotFound("User".into()), StatusCode::NOT_FOUND),
            (InkwellError::Conflict("dup".into()), StatusCode::CONFLICT),
            (InkwellError::ValidationError("bad".into()), StatusCode::BAD_REQUEST),
            (InkwellError::DatabaseError("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (InkwellError::Unavailable("session store".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_details_not_leaked() {
        let response =
            AppError::Database("relation \"users\" does not exist".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("relation"));
        assert!(text.contains("DATABASE_ERROR"));
    }

    #[tokio::test]
    async fn test_elapsed_deadline_is_unavailable() {
        let err: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert_eq!(
            handle_timeout(err).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let err: BoxError = "other".into();
        assert_eq!(
            handle_timeout(err).await.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_serialization() {
        let json = serde_json::to_value(ApiError::conflict("already an author")).unwrap();
        assert_eq!(json["code"], "CONFLICT");
        assert_eq!(json["message"], "already an author");
    }
}
