//! Service facade.
//!
//! One wiring point the API and connection layers call into; every
//! collaborator is an injected `Arc`, nothing is ambient. The mutation
//! path mirrors the scheduler: recompute the cached status immediately so
//! clients never wait a tick to see it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::live::{ConnectionId, EventRouter, LiveEvent, PresenceState, PresenceTracker, Topic};
use crate::notify::{NotificationDispatcher, NotifyEvent, PreferenceResolver};
use crate::status::{self, DueDateSummary};
use crate::store::{
    NotificationPreferences, NotificationRecord, NotificationType, PreferenceUpdate, Store,
    TaskRecord,
};

/// What changed about a task, as reported by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMutation {
    Created,
    Updated,
    Moved,
    Deleted,
    DueDateChanged,
}

pub struct ReminderService {
    store: Arc<dyn Store>,
    router: Arc<EventRouter>,
    presence: Arc<PresenceTracker>,
    dispatcher: Arc<NotificationDispatcher>,
    resolver: Arc<PreferenceResolver>,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn Store>,
        router: Arc<EventRouter>,
        presence: Arc<PresenceTracker>,
        dispatcher: Arc<NotificationDispatcher>,
        resolver: Arc<PreferenceResolver>,
    ) -> Self {
        Self {
            store,
            router,
            presence,
            dispatcher,
            resolver,
        }
    }

    /// React to a task mutation: refresh the cached status, reset the
    /// fired-reminder history on a due-date change, and publish the change
    /// to the task's project topic.
    pub async fn on_task_mutated(
        &self,
        task: &TaskRecord,
        mutation: TaskMutation,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if mutation == TaskMutation::Deleted {
            self.publish_to_project(task, LiveEvent::TaskDeleted { task_id: task.id });
            return Ok(());
        }

        let mut task = task.clone();
        let computed = status::classify_task(&task, now);
        if computed != task.due_date_status {
            self.store.update_task_status(task.id, computed).await?;
            task.due_date_status = computed;
        }

        if mutation == TaskMutation::DueDateChanged {
            // A new deadline re-arms every reminder kind.
            self.store.reset_fired_reminders(task.id).await?;
            info!(task_id = %task.id, "due date changed, reminder history reset");
            self.publish_to_project(
                &task,
                LiveEvent::TaskDueDateChanged {
                    task_id: task.id,
                    due_at: task.due_at,
                    has_time_component: task.has_time_component,
                },
            );
        }

        let event = match mutation {
            TaskMutation::Created => LiveEvent::TaskCreated { task: task.clone() },
            TaskMutation::Updated | TaskMutation::DueDateChanged => {
                LiveEvent::TaskUpdated { task: task.clone() }
            }
            TaskMutation::Moved => LiveEvent::TaskMoved {
                task_id: task.id,
                lifecycle: task.lifecycle,
            },
            TaskMutation::Deleted => unreachable!("handled above"),
        };
        self.publish_to_project(&task, event);
        Ok(())
    }

    fn publish_to_project(&self, task: &TaskRecord, event: LiveEvent) {
        if let Some(project_id) = task.project_id {
            self.router.publish(&Topic::Project(project_id), &event);
        }
    }

    /// Notify a user they were assigned a task.
    pub async fn notify_assigned(
        &self,
        task: &TaskRecord,
        user_id: &str,
    ) -> Result<NotificationRecord, StoreError> {
        let mut event = NotifyEvent::new(
            user_id,
            NotificationType::Assigned,
            format!("You were assigned \"{}\"", task.title),
        )
        .with_task(task.id);
        if let Some(project_id) = task.project_id {
            event = event.with_project(project_id);
        }
        self.dispatcher.dispatch(event).await
    }

    /// Notify a user they were mentioned.
    pub async fn notify_mention(
        &self,
        user_id: &str,
        message: impl Into<String>,
        task_id: Option<Uuid>,
    ) -> Result<NotificationRecord, StoreError> {
        let mut event = NotifyEvent::new(user_id, NotificationType::Mention, message);
        if let Some(task_id) = task_id {
            event = event.with_task(task_id);
        }
        self.dispatcher.dispatch(event).await
    }

    /// Current due-date summary for one user.
    pub async fn due_date_summary(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DueDateSummary, StoreError> {
        let tasks = self.store.list_open_tasks_for_user(user_id).await?;
        Ok(status::summarize(tasks.iter(), now))
    }

    /// Snooze (or clear the snooze on) a task. The fired-reminder history
    /// is untouched: kinds that fired before the snooze stay fired.
    pub async fn snooze_task(
        &self,
        task_id: Uuid,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.store.set_task_snooze(task_id, until).await
    }

    pub async fn mark_notification_read(&self, id: Uuid) -> Result<bool, StoreError> {
        self.store.mark_read(id).await
    }

    pub async fn list_notifications(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        self.store.list_notifications_for_user(user_id, limit).await
    }

    pub async fn preferences(
        &self,
        user_id: &str,
    ) -> Result<NotificationPreferences, StoreError> {
        self.resolver.resolve(user_id).await
    }

    pub async fn update_preferences(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<NotificationPreferences, StoreError> {
        self.resolver.update(user_id, update).await
    }

    // ---- connection layer pass-throughs ----

    pub fn join(
        &self,
        connection: ConnectionId,
        topic: Topic,
        sender: tokio::sync::mpsc::UnboundedSender<LiveEvent>,
    ) {
        self.router.subscribe(topic, connection, sender);
    }

    pub fn leave(&self, connection: ConnectionId, topic: &Topic) {
        self.router.unsubscribe(topic, connection);
    }

    /// A connection dropped: remove its subscriptions and start the
    /// observer's presence grace timer.
    pub fn on_disconnect(&self, connection: ConnectionId, observer_id: &str) {
        self.router.disconnect(connection);
        self.presence.on_disconnect(observer_id);
    }

    pub fn heartbeat(&self, observer_id: &str, now: DateTime<Utc>) {
        self.presence.heartbeat(observer_id, now);
    }

    pub fn presence_of(&self, observer_id: &str, now: DateTime<Utc>) -> PresenceState {
        self.presence.classify(observer_id, now)
    }

    pub fn typing_started(&self, channel_id: &str, user_id: &str) {
        self.router.publish(
            &Topic::Channel(channel_id.to_string()),
            &LiveEvent::TypingStarted {
                channel_id: channel_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }

    pub fn typing_stopped(&self, channel_id: &str, user_id: &str) {
        self.router.publish(
            &Topic::Channel(channel_id.to_string()),
            &LiveEvent::TypingStopped {
                channel_id: channel_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }
}
