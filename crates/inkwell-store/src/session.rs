//! Redis-backed session store
//!
//! Records are stored as `<prefix><sha256(token)> -> subject_id` with `EX`
//! expiry, so the raw token never reaches Redis.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};

use inkwell_core::{InkwellError, Result, SessionConfig, SessionStore};

use crate::bounded;

const STORE: &str = "session store";

/// Storage key for a token
pub fn session_key(prefix: &str, token: &str) -> String {
    format!("{prefix}{:x}", Sha256::digest(token.as_bytes()))
}

#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    prefix: String,
    op_timeout: Duration,
}

impl RedisSessionStore {
    /// Connect to Redis. The initial connection is bounded by the op timeout.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| InkwellError::ConfigError(format!("invalid Redis URL: {e}")))?;
        let conn = bounded(STORE, config.op_timeout(), ConnectionManager::new(client)).await?;

        Ok(Self {
            conn,
            prefix: config.key_prefix.clone(),
            op_timeout: config.op_timeout(),
        })
    }

    fn key(&self, token: &str) -> String {
        session_key(&self.prefix, token)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, token: &str, subject_id: u64, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.key(token);
        // EX 0 is rejected by Redis
        let secs = ttl.as_secs().max(1);

        bounded(
            STORE,
            self.op_timeout,
            redis::cmd("SET")
                .arg(&key)
                .arg(subject_id)
                .arg("EX")
                .arg(secs)
                .query_async::<_, ()>(&mut conn),
        )
        .await
    }

    async fn get(&self, token: &str) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        let key = self.key(token);

        bounded(
            STORE,
            self.op_timeout,
            redis::cmd("GET").arg(&key).query_async::<_, Option<u64>>(&mut conn),
        )
        .await
    }

    async fn delete(&self, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.key(token);

        bounded(
            STORE,
            self.op_timeout,
            redis::cmd("DEL").arg(&key).query_async::<_, ()>(&mut conn),
        )
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        bounded(
            STORE,
            self.op_timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await
        .map(|_| ())
    }
}
