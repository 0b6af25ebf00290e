//! Notifications and the `blog.created` worker
//!
//! The worker turns each `PostCreated` into a notification for the author's
//! user. It runs against the Redis stream (`inkwell-notifier`) or, in
//! `--in-memory` mode, against the in-process event bus.

use crate::error::AppError;
use inkwell_core::{Notification, NotificationStore, PostCreated};
use inkwell_store::{RedisStreamConsumer, StreamDelivery};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Entries requested per stream read
const READ_BATCH: usize = 16;

/// Back-off after a failed stream read or notification write
const RETRY_DELAY: Duration = Duration::from_secs(1);

pub fn published_message(title: &str) -> String {
    format!("Your post \"{title}\" has been published")
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    pub async fn list_for_user(&self, user_id: u64) -> Result<Vec<Notification>, AppError> {
        Ok(self.store.list_for_user(user_id).await?)
    }

    /// Store the notification for one event
    pub async fn handle(&self, event: &PostCreated) -> inkwell_core::Result<Notification> {
        let notification = self
            .store
            .create_notification(event.user_id, &published_message(&event.title))
            .await?;
        debug!(
            post_id = event.post_id,
            user_id = event.user_id,
            notification_id = notification.id,
            "Notification stored"
        );
        Ok(notification)
    }
}

/// What happened to one batch of stream entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BatchOutcome {
    delivered: usize,
    failed: usize,
}

impl BatchOutcome {
    /// Whether the next read should go back to this consumer's pending
    /// entries instead of waiting for new ones.
    ///
    /// A full pending batch with no failures means more may be waiting. A
    /// failed pending entry is left for the next round so one bad entry
    /// cannot stall new deliveries.
    fn reread_pending(self, from_pending: bool) -> bool {
        if from_pending {
            self.delivered == READ_BATCH && self.failed == 0
        } else {
            self.failed > 0
        }
    }
}

/// Consume the Redis stream until `shutdown` resolves.
///
/// Entries left pending by an earlier run are replayed first. An entry is
/// acknowledged once handled, or immediately when it cannot be decoded.
/// Entries whose notification could not be stored stay pending and are
/// retried after `RETRY_DELAY`.
pub async fn run_stream_worker(
    consumer: RedisStreamConsumer,
    service: NotificationService,
    shutdown: impl std::future::Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        let ensured = tokio::select! {
            _ = &mut shutdown => return,
            ensured = consumer.ensure_group() => ensured,
        };
        match ensured {
            Ok(()) => break,
            Err(e) => {
                warn!(error = %e, "Could not ensure consumer group, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
    info!("Notification worker consuming event stream");

    let mut pending = true;
    loop {
        let from_pending = pending;
        let read = async {
            if from_pending {
                consumer.read_pending(READ_BATCH).await
            } else {
                consumer.read(READ_BATCH).await
            }
        };
        let deliveries = tokio::select! {
            _ = &mut shutdown => break,
            read = read => read,
        };

        let deliveries = match deliveries {
            Ok(deliveries) => deliveries,
            Err(e) => {
                warn!(error = %e, "Stream read failed");
                pending = true;
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        if from_pending && !deliveries.is_empty() {
            info!(count = deliveries.len(), "Replaying pending stream entries");
        }
        let outcome = process_batch(&consumer, &service, deliveries).await;
        pending = outcome.reread_pending(from_pending);
        if outcome.failed > 0 {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    info!("Notification worker stopped");
}

async fn process_batch(
    consumer: &RedisStreamConsumer,
    service: &NotificationService,
    deliveries: Vec<StreamDelivery>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        delivered: deliveries.len(),
        failed: 0,
    };

    for delivery in deliveries {
        let handled = match &delivery.event {
            Some(event) => match service.handle(event).await {
                Ok(_) => true,
                Err(e) => {
                    error!(entry = %delivery.id, post_id = event.post_id, error = %e, "Failed to store notification");
                    false
                }
            },
            None => {
                warn!(entry = %delivery.id, "Skipping undecodable stream entry");
                true
            }
        };

        if !handled {
            outcome.failed += 1;
        } else if let Err(e) = consumer.ack(&delivery.id).await {
            warn!(entry = %delivery.id, error = %e, "Failed to acknowledge entry");
        }
    }

    outcome
}

/// Consume the in-process bus until every sender is gone
pub async fn run_broadcast_worker(
    mut events: broadcast::Receiver<PostCreated>,
    service: NotificationService,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Err(e) = service.handle(&event).await {
                    error!(post_id = event.post_id, error = %e, "Failed to store notification");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notification worker lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
