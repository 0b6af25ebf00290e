//! Notification handlers
//!
//! Author: hephaex@gmail.com

use crate::auth::Identity;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use inkwell_core::Notification;
use std::sync::Arc;

/// Caller's notifications, newest first
#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    tag = "notifications",
    responses(
        (status = 200, description = "Notifications", body = [Notification]),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, AppError> {
    let mut notifications = state
        .notifications
        .list_for_user(identity.subject_id)
        .await?;
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(Json(notifications))
}
