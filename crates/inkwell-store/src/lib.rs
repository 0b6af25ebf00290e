//! Inkwell Store - PostgreSQL and Redis backends
//!
//! - [`PgStore`]: users, authors, posts and notifications in PostgreSQL
//! - [`RedisSessionStore`]: session records with TTL in Redis
//! - [`RedisStreamPublisher`] / [`RedisStreamConsumer`]: `PostCreated` events on a Redis stream
//!
//! Author: hephaex@gmail.com

pub mod broker;
pub mod postgres;
pub mod session;

pub use broker::{RedisStreamConsumer, RedisStreamPublisher, StreamDelivery};
pub use postgres::PgStore;
pub use session::{session_key, RedisSessionStore};

use std::future::Future;
use std::time::Duration;

use inkwell_core::{InkwellError, Result};

/// Run a Redis operation under a deadline.
///
/// Both a timeout and a Redis error surface as `Unavailable(what)`; the
/// underlying cause is logged, not returned.
pub(crate) async fn bounded<T, F>(what: &'static str, limit: Duration, op: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(store = what, error = %e, "Redis operation failed");
            Err(InkwellError::Unavailable(what.to_string()))
        }
        Err(_) => {
            tracing::warn!(store = what, timeout_ms = limit.as_millis() as u64, "Redis operation timed out");
            Err(InkwellError::Unavailable(what.to_string()))
        }
    }
}
