//! Author promotion handler
//!
//! Author: hephaex@gmail.com

use crate::auth::Identity;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BecomeAuthorResponse {
    pub status: String,
    pub author_id: u64,
}

/// Become an author
///
/// Moves the caller from `USER` to `AUTHOR`. Tokens issued earlier keep the
/// old role; call `/auth/refresh` to get one carrying `AUTHOR`.
#[utoipa::path(
    post,
    path = "/api/v1/authors",
    tag = "authors",
    responses(
        (status = 200, description = "Caller is now an author", body = BecomeAuthorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
        (status = 409, description = "Already an author", body = crate::error::ApiError),
        (status = 503, description = "Session store unavailable", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn become_author(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, AppError> {
    let author = state.promotion.promote(identity.subject_id).await?;

    Ok(Json(BecomeAuthorResponse {
        status: "author".to_string(),
        author_id: author.id,
    }))
}
