//! Inkwell notification worker
//!
//! Consumes `blog.created` events from the Redis stream and stores a
//! notification for each post's author.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use clap::Parser;
use inkwell_api::notifications::{run_stream_worker, NotificationService};
use inkwell_api::{init_tracing, load_config};
use inkwell_store::{PgStore, RedisStreamConsumer};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "inkwell-notifier", version, about = "Inkwell notification worker")]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Consumer name within the group (defaults to the configured one)
    #[arg(long)]
    consumer: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).context("Invalid configuration")?;
    if let Some(consumer) = cli.consumer {
        config.events.consumer_name = consumer;
    }
    init_tracing(&config.logging);

    let store = PgStore::connect(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let consumer = RedisStreamConsumer::connect(&config.session, &config.events)
        .await
        .context("Failed to connect to Redis")?;

    tracing::info!(
        stream = %config.events.stream_key,
        group = %config.events.consumer_group,
        consumer = %config.events.consumer_name,
        "Notification worker starting"
    );

    run_stream_worker(
        consumer,
        NotificationService::new(Arc::new(store)),
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await;

    Ok(())
}
