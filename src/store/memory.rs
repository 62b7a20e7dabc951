//! In-memory storage backend.
//!
//! Implements the full [`Store`](super::Store) contract over
//! `tokio::sync::RwLock`-guarded maps. Used by the test suite and for
//! embedded single-process deployments; production deployments supply their
//! own backend behind the same traits.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{
    CreateNotificationParams, DueDateStatus, NotificationPreferences, NotificationRecord,
    NotificationStore, PreferenceStore, PreferenceUpdate, ReminderKind, TaskLifecycle,
    TaskRecord, TaskStore,
};

/// Embedded in-memory backend.
#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<Uuid, TaskRecord>>,
    preferences: RwLock<HashMap<String, NotificationPreferences>>,
    notifications: RwLock<Vec<NotificationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a task row. Test/seed helper; the task mutation
    /// API proper lives outside this core.
    pub async fn upsert_task(&self, task: TaskRecord) {
        self.tasks.write().await.insert(task.id, task);
    }

    /// Snapshot of every stored notification, oldest first.
    pub async fn all_notifications(&self) -> Vec<NotificationRecord> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn find_due_tasks(&self, _now: DateTime<Utc>) -> Result<Vec<TaskRecord>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|t| t.lifecycle != TaskLifecycle::Done && t.due_at.is_some())
            .cloned()
            .collect())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list_open_tasks_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|t| {
                t.lifecycle != TaskLifecycle::Done && t.assignee.as_deref() == Some(user_id)
            })
            .cloned()
            .collect())
    }

    async fn list_active_assignees(&self) -> Result<Vec<String>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut users: Vec<String> = tasks
            .values()
            .filter(|t| t.lifecycle != TaskLifecycle::Done)
            .filter_map(|t| t.assignee.clone())
            .collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        status: DueDateStatus,
    ) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;
        task.due_date_status = status;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn update_task_reminders(
        &self,
        id: Uuid,
        expected_version: i64,
        fired: &BTreeSet<ReminderKind>,
        last_reminder_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;
        if task.version != expected_version {
            return Ok(false);
        }
        task.fired_reminder_kinds = fired.clone();
        task.last_reminder_at = Some(last_reminder_at);
        task.version += 1;
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn reset_fired_reminders(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;
        task.fired_reminder_kinds.clear();
        task.version += 1;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn set_task_snooze(
        &self,
        id: Uuid,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;
        task.snoozed_until = until;
        task.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get_or_create_preferences(
        &self,
        user_id: &str,
    ) -> Result<NotificationPreferences, StoreError> {
        // Single write lock makes concurrent first access an upsert.
        let mut prefs = self.preferences.write().await;
        Ok(prefs
            .entry(user_id.to_string())
            .or_insert_with(|| NotificationPreferences::defaults_for(user_id, Utc::now()))
            .clone())
    }

    async fn update_preferences(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<NotificationPreferences, StoreError> {
        let mut prefs = self.preferences.write().await;
        let entry = prefs
            .entry(user_id.to_string())
            .or_insert_with(|| NotificationPreferences::defaults_for(user_id, Utc::now()));
        if let Some(email) = &update.email {
            entry.email = email.clone();
        }
        if let Some(webhook) = &update.webhook {
            entry.webhook = webhook.clone();
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(
        &self,
        params: &CreateNotificationParams,
    ) -> Result<NotificationRecord, StoreError> {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            user_id: params.user_id.clone(),
            kind: params.kind,
            message: params.message.clone(),
            related_task_id: params.related_task_id,
            related_project_id: params.related_project_id,
            read: false,
            created_at: Utc::now(),
        };
        self.notifications.write().await.push(record.clone());
        Ok(record)
    }

    async fn mark_read(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut notifications = self.notifications.write().await;
        match notifications.iter_mut().find(|n| n.id == id) {
            Some(record) => {
                record.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_notifications_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
