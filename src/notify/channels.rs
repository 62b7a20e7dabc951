//! External delivery channels and the bounded delivery worker pool.
//!
//! A channel is an opaque send sink; message-body rendering happens
//! upstream of this crate. Sends run on a bounded queue consumed by a
//! small worker pool, so dispatch never blocks on channel latency and
//! failures are captured in one place instead of leaking out of detached
//! futures.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::store::{ChannelKind, NotificationType};

/// The payload handed to an external channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelDelivery {
    pub user_id: String,
    pub kind: NotificationType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_task_id: Option<Uuid>,
}

/// An opaque external send sink (email relay, chat webhook, ...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, delivery: &ChannelDelivery) -> Result<(), ChannelError>;
}

/// Chat-webhook channel: posts the delivery as JSON to a fixed endpoint.
pub struct WebhookChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(&self, delivery: &ChannelDelivery) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(delivery)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                channel: "webhook",
                reason: e.to_string(),
            })?;
        response
            .error_for_status()
            .map_err(|e| ChannelError::SendFailed {
                channel: "webhook",
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

struct DeliveryJob {
    channel: Arc<dyn NotificationChannel>,
    delivery: ChannelDelivery,
}

/// Bounded worker pool consuming delivery jobs.
///
/// Submission is non-blocking: when the queue is full the job is dropped
/// with a warning. The durable in-app record already exists by the time a
/// job is submitted, so a dropped external send degrades, never loses, the
/// notification.
pub struct DeliveryPool {
    tx: mpsc::Sender<DeliveryJob>,
    workers: Vec<JoinHandle<()>>,
}

impl DeliveryPool {
    pub fn from_config(config: &crate::config::DeliveryConfig) -> Self {
        Self::spawn(config.queue_capacity, config.workers)
    }

    pub fn spawn(capacity: usize, worker_count: usize) -> Self {
        let (tx, rx) = mpsc::channel::<DeliveryJob>(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..worker_count.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };
                        let channel = job.channel.kind().as_str();
                        match job.channel.send(&job.delivery).await {
                            Ok(()) => {
                                debug!(worker, channel, user_id = %job.delivery.user_id, "delivered")
                            }
                            Err(error) => {
                                warn!(worker, channel, %error, "external delivery failed")
                            }
                        }
                    }
                })
            })
            .collect();
        Self { tx, workers }
    }

    /// Enqueue a send. Never blocks; a full or closed queue drops the job.
    pub fn submit(&self, channel: Arc<dyn NotificationChannel>, delivery: ChannelDelivery) {
        let kind = channel.kind().as_str();
        let job = DeliveryJob { channel, delivery };
        if let Err(error) = self.tx.try_send(job) {
            warn!(channel = kind, %error, "delivery queue rejected job");
        }
    }

    /// Close the queue and wait for in-flight sends to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
