//! Inkwell API - HTTP server
//!
//! Registration, login and session management, author promotion, blog
//! posts and notifications behind a bearer-token gate.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod notifications;
pub mod openapi;
pub mod posts;
pub mod routes;
pub mod state;

use axum::{error_handling::HandleErrorLayer, middleware as axum_middleware, routing::get, Router};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(axum_middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_counter_middleware,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(error::handle_timeout))
                .timeout(timeout),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

#[cfg(any(test, feature = "test-utils"))]
pub use testing::{
    create_router_for_testing, create_router_with_config, create_router_with_sessions, TestApp,
};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &inkwell_core::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "inkwell_api={level},inkwell_store={level},tower_http={level},audit=info",
            level = config.level
        )
        .into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load configuration: optional TOML file, then environment overrides
pub fn load_config(path: Option<&std::path::Path>) -> Result<inkwell_core::AppConfig, inkwell_core::ConfigError> {
    let config = match path {
        Some(path) => inkwell_core::AppConfig::from_file(path)?.with_env_override()?,
        None => inkwell_core::AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}
