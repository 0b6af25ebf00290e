//! Redis Streams event transport
//!
//! Each `PostCreated` is appended with `XADD` as two fields:
//! `routing_key` (`blog.created`) and `payload` (JSON). The notification
//! worker reads through a consumer group and acknowledges with `XACK`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadReply};
use tracing::{instrument, warn};

use inkwell_core::{
    EventPublisher, EventsConfig, InkwellError, PostCreated, Result, SessionConfig,
};

use crate::bounded;

const STREAM: &str = "event stream";

async fn connect(redis_url: &str, limit: Duration) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| InkwellError::ConfigError(format!("invalid Redis URL: {e}")))?;
    bounded(STREAM, limit, ConnectionManager::new(client)).await
}

/// Publishes events to the configured stream
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: ConnectionManager,
    stream_key: String,
    op_timeout: Duration,
}

impl RedisStreamPublisher {
    pub async fn connect(session: &SessionConfig, events: &EventsConfig) -> Result<Self> {
        let conn = connect(&session.redis_url, session.op_timeout()).await?;
        Ok(Self {
            conn,
            stream_key: events.stream_key.clone(),
            op_timeout: session.op_timeout(),
        })
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    #[instrument(skip(self, event), fields(stream_key = %self.stream_key, post_id = event.post_id))]
    async fn publish(&self, event: &PostCreated) -> Result<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| InkwellError::Other(e.into()))?;
        let mut conn = self.conn.clone();

        bounded(
            STREAM,
            self.op_timeout,
            redis::cmd("XADD")
                .arg(&self.stream_key)
                .arg("*")
                .arg("routing_key")
                .arg(PostCreated::ROUTING_KEY)
                .arg("payload")
                .arg(&payload)
                .query_async::<_, String>(&mut conn),
        )
        .await
        .map(|_| ())
    }
}

/// A message read from the stream
#[derive(Debug, Clone)]
pub struct StreamDelivery {
    /// Stream entry id, needed for acknowledgement
    pub id: String,
    /// `None` when the entry is not a well-formed `blog.created` event
    pub event: Option<PostCreated>,
}

/// Consumer-group reader for the notification worker
pub struct RedisStreamConsumer {
    conn: ConnectionManager,
    stream_key: String,
    group: String,
    consumer: String,
    block_ms: u64,
    op_timeout: Duration,
}

impl RedisStreamConsumer {
    pub async fn connect(session: &SessionConfig, events: &EventsConfig) -> Result<Self> {
        let conn = connect(&session.redis_url, session.op_timeout()).await?;
        Ok(Self {
            conn,
            stream_key: events.stream_key.clone(),
            group: events.consumer_group.clone(),
            consumer: events.consumer_name.clone(),
            block_ms: events.block_ms,
            op_timeout: session.op_timeout(),
        })
    }

    /// Create the consumer group (and stream) if missing.
    ///
    /// An existing group (`BUSYGROUP`) is success; any other failure is
    /// `Unavailable` and the caller should retry.
    pub async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM");
        let create = cmd.query_async::<_, ()>(&mut conn);

        match tokio::time::timeout(self.op_timeout, create).await {
            Ok(Ok(())) => {
                tracing::info!(group = %self.group, stream_key = %self.stream_key, "Created consumer group");
                Ok(())
            }
            Ok(Err(e)) if is_busy_group(&e) => Ok(()),
            Ok(Err(e)) => {
                warn!(group = %self.group, error = %e, "Failed to create consumer group");
                Err(InkwellError::Unavailable(STREAM.to_string()))
            }
            Err(_) => {
                warn!(group = %self.group, "Timed out creating consumer group");
                Err(InkwellError::Unavailable(STREAM.to_string()))
            }
        }
    }

    /// Block for up to `block_ms` waiting for new entries.
    pub async fn read(&self, count: usize) -> Result<Vec<StreamDelivery>> {
        self.read_group(">", count, Some(self.block_ms)).await
    }

    /// Entries already delivered to this consumer but never acknowledged.
    ///
    /// Returns immediately; an empty result means nothing is pending.
    pub async fn read_pending(&self, count: usize) -> Result<Vec<StreamDelivery>> {
        self.read_group("0", count, None).await
    }

    async fn read_group(
        &self,
        start: &str,
        count: usize,
        block_ms: Option<u64>,
    ) -> Result<Vec<StreamDelivery>> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(count);
        if let Some(block_ms) = block_ms {
            cmd.arg("BLOCK").arg(block_ms);
        }
        cmd.arg("STREAMS").arg(&self.stream_key).arg(start);

        let limit = self.op_timeout + Duration::from_millis(block_ms.unwrap_or(0));
        let reply = bounded(
            STREAM,
            limit,
            cmd.query_async::<_, Option<StreamReadReply>>(&mut conn),
        )
        .await?;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(|entry| StreamDelivery {
                        event: decode_entry(&entry),
                        id: entry.id,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn ack(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        bounded(
            STREAM,
            self.op_timeout,
            redis::cmd("XACK")
                .arg(&self.stream_key)
                .arg(&self.group)
                .arg(id)
                .query_async::<_, u64>(&mut conn),
        )
        .await
        .map(|_| ())
    }
}

fn is_busy_group(e: &redis::RedisError) -> bool {
    e.code() == Some("BUSYGROUP")
}

fn decode_entry(entry: &StreamId) -> Option<PostCreated> {
    let routing_key: String = entry.get("routing_key")?;
    if routing_key != PostCreated::ROUTING_KEY {
        return None;
    }
    let payload: String = entry.get("payload")?;
    decode_payload(&payload)
}

fn decode_payload(payload: &str) -> Option<PostCreated> {
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Discarding malformed event payload");
            None
        }
    }
}
