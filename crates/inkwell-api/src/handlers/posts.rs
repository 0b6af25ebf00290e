//! Blog post handlers
//!
//! Author: hephaex@gmail.com

use crate::auth::Identity;
use crate::error::{AppError, JsonBody};
use crate::posts::{CreatePostRequest, ListPostsQuery};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use inkwell_core::BlogPost;
use std::sync::Arc;

/// Publish a post
///
/// Requires role `AUTHOR`.
#[utoipa::path(
    post,
    path = "/api/v1/posts",
    tag = "posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = BlogPost),
        (status = 400, description = "Invalid title", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Caller is not an author", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    JsonBody(request): JsonBody<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let post = state.posts.create_post(&identity, request).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// List posts, newest first
#[utoipa::path(
    get,
    path = "/api/v1/posts",
    tag = "posts",
    params(ListPostsQuery),
    responses(
        (status = 200, description = "Posts", body = [BlogPost]),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPostsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let posts = state.posts.list_posts(&query).await?;
    Ok(Json(posts))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    tag = "posts",
    params(("id" = u64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = BlogPost),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 404, description = "Post not found", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let post = state.posts.get_post(id).await?;
    Ok(Json(post))
}
