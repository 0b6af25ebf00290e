//! Inkwell API Server
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use clap::Parser;
use inkwell_api::notifications::{run_broadcast_worker, NotificationService};
use inkwell_api::state::{AppState, Stores};
use inkwell_api::{create_router, init_tracing, load_config};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "inkwell-api", version, about = "Inkwell blogging platform API server")]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep all state in memory and run the notification worker in-process
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("Invalid configuration")?;
    init_tracing(&config.logging);

    let stores = if cli.in_memory {
        let (stores, bus) = Stores::in_memory();
        tokio::spawn(run_broadcast_worker(
            bus.subscribe(),
            NotificationService::new(stores.notifications.clone()),
        ));
        tracing::warn!("Running with in-memory stores; all data is lost on exit");
        stores
    } else {
        Stores::connect(&config)
            .await
            .context("Failed to connect to backing stores")?
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, stores));
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Inkwell API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    state.set_ready(true);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C; readiness drops before in-flight requests drain
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    state.set_ready(false);
    tracing::info!(
        requests_served = state.get_request_count(),
        "Shutdown requested, draining connections"
    );
}
