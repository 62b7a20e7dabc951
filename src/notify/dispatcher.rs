//! Notification dispatch pipeline.
//!
//! Ordering contract per event: (1) persist the durable in-app record,
//! (2) publish it to the user's live topic, (3) fan out to enabled
//! external channels through the bounded delivery pool. Step 1 failing
//! loses the event (logged by the caller); steps 2 and 3 are best-effort
//! and independent of each other.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::error::StoreError;
use crate::live::{EventRouter, LiveEvent, Topic};
use crate::notify::channels::{ChannelDelivery, DeliveryPool, NotificationChannel};
use crate::notify::preferences::PreferenceResolver;
use crate::store::{CreateNotificationParams, NotificationRecord, NotificationStore, NotificationType};

/// A triggered event headed for one user.
#[derive(Debug, Clone)]
pub struct NotifyEvent {
    pub user_id: String,
    pub kind: NotificationType,
    pub message: String,
    pub related_task_id: Option<Uuid>,
    pub related_project_id: Option<Uuid>,
}

impl NotifyEvent {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            message: message.into(),
            related_task_id: None,
            related_project_id: None,
        }
    }

    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.related_task_id = Some(task_id);
        self
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.related_project_id = Some(project_id);
        self
    }
}

pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    resolver: Arc<PreferenceResolver>,
    router: Arc<EventRouter>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    pool: DeliveryPool,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        resolver: Arc<PreferenceResolver>,
        router: Arc<EventRouter>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        pool: DeliveryPool,
    ) -> Self {
        Self {
            store,
            resolver,
            router,
            channels,
            pool,
        }
    }

    /// Dispatch one event. Returns the persisted record; a storage error
    /// means the event is lost and the caller logs it, nothing is retried.
    pub async fn dispatch(&self, event: NotifyEvent) -> Result<NotificationRecord, StoreError> {
        let record = self
            .store
            .create_notification(&CreateNotificationParams {
                user_id: event.user_id.clone(),
                kind: event.kind,
                message: event.message.clone(),
                related_task_id: event.related_task_id,
                related_project_id: event.related_project_id,
            })
            .await?;

        self.router.publish(
            &Topic::User(event.user_id.clone()),
            &LiveEvent::NotificationCreated {
                notification: record.clone(),
            },
        );

        match self.resolver.resolve(&event.user_id).await {
            Ok(prefs) => {
                for channel in &self.channels {
                    if prefs.channel(channel.kind()).enabled_for(event.kind) {
                        self.pool.submit(
                            Arc::clone(channel),
                            ChannelDelivery {
                                user_id: event.user_id.clone(),
                                kind: event.kind,
                                message: event.message.clone(),
                                related_task_id: event.related_task_id,
                            },
                        );
                    }
                }
            }
            Err(error) => {
                warn!(user_id = %event.user_id, %error, "preference resolution failed, skipping external fan-out");
            }
        }

        Ok(record)
    }

    /// Drain the delivery pool on shutdown.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}
