//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::{auth_middleware, require_role};
use crate::handlers::{auth, authors, notifications, posts};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use inkwell_core::Role;
use std::sync::Arc;

/// API v1 routes (mounted under `/api/v1`)
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler));

    // Bearer token and live session required
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/authors", post(authors::become_author))
        .route(
            "/posts",
            get(posts::list_posts).merge(
                post(posts::create_post)
                    .route_layer(middleware::from_fn(require_role(Role::Author))),
            ),
        )
        .route("/posts/:id", get(posts::get_post))
        .route("/notifications", get(notifications::list_notifications))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}
