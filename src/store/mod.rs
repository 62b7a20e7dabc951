//! Storage abstraction layer.
//!
//! Provides backend-agnostic persistence traits for the reminder core. The
//! storage engine itself is an external collaborator; this module defines
//! the read/write contract it must satisfy, split into sub-traits so leaf
//! consumers can depend on exactly what they use:
//!
//! - [`TaskStore`]: task scans and the versioned reminder-history write path
//! - [`PreferenceStore`]: lazy-default notification preference matrices
//! - [`NotificationStore`]: the durable in-app notification log
//!
//! The [`Store`] supertrait combines them for consumers that hold one
//! `Arc<dyn Store>`. An embedded in-memory backend lives in [`memory`].

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Task lifecycle state. `Done` is terminal for reminder purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskLifecycle {
    Todo,
    InProgress,
    InReview,
    Done,
}

impl TaskLifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Done => "done",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "in_review" => Some(Self::InReview),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Derived urgency classification of a task relative to its due date.
///
/// Cached on the task row; recomputed by the scheduler every tick and by
/// the mutation path, so a persisted value is stale for at most one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueDateStatus {
    None,
    Overdue,
    DueToday,
    DueSoon,
    OnTrack,
    Completed,
}

impl DueDateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Overdue => "overdue",
            Self::DueToday => "due_today",
            Self::DueSoon => "due_soon",
            Self::OnTrack => "on_track",
            Self::Completed => "completed",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "overdue" => Some(Self::Overdue),
            "due_today" => Some(Self::DueToday),
            "due_soon" => Some(Self::DueSoon),
            "on_track" => Some(Self::OnTrack),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A named temporal reminder trigger.
///
/// [`ReminderKind::ALL`] fixes the evaluation order used by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Overdue,
    DueIn24h,
    DueIn1h,
    DueToday,
}

impl ReminderKind {
    /// Fixed scheduler evaluation order.
    pub const ALL: [ReminderKind; 4] = [
        Self::Overdue,
        Self::DueIn24h,
        Self::DueIn1h,
        Self::DueToday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::DueIn24h => "due_in_24h",
            Self::DueIn1h => "due_in_1h",
            Self::DueToday => "due_today",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "overdue" => Some(Self::Overdue),
            "due_in_24h" => Some(Self::DueIn24h),
            "due_in_1h" => Some(Self::DueIn1h),
            "due_today" => Some(Self::DueToday),
            _ => None,
        }
    }
}

/// Notification event type, keyed into the preference matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Assigned,
    DueSoon,
    Overdue,
    Mention,
    Digest,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::DueSoon => "due_soon",
            Self::Overdue => "overdue",
            Self::Mention => "mention",
            Self::Digest => "digest",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "assigned" => Some(Self::Assigned),
            "due_soon" => Some(Self::DueSoon),
            "overdue" => Some(Self::Overdue),
            "mention" => Some(Self::Mention),
            "digest" => Some(Self::Digest),
            _ => None,
        }
    }
}

/// External delivery channel. The in-app record is implicit and always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Webhook => "webhook",
        }
    }
}

/// A task row as seen by the reminder core.
///
/// `fired_reminder_kinds` is append-only: a kind, once present, is removed
/// only by the explicit due-date-change reset. `version` backs the
/// optimistic write path in [`TaskStore::update_task_reminders`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub title: String,
    pub lifecycle: TaskLifecycle,
    pub due_at: Option<DateTime<Utc>>,
    /// Whether `due_at` carries a meaningful time of day (date+time vs date-only).
    pub has_time_component: bool,
    pub due_date_status: DueDateStatus,
    pub fired_reminder_kinds: BTreeSet<ReminderKind>,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub assignee: Option<String>,
    pub project_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// New open task with no due date, at version 0.
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            lifecycle: TaskLifecycle::Todo,
            due_at: None,
            has_time_component: false,
            due_date_status: DueDateStatus::None,
            fired_reminder_kinds: BTreeSet::new(),
            snoozed_until: None,
            last_reminder_at: None,
            assignee: None,
            project_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-channel opt-in flags, one per notification type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPrefs {
    pub assigned: bool,
    pub due_soon: bool,
    pub overdue: bool,
    pub mention: bool,
    pub digest: bool,
}

impl Default for ChannelPrefs {
    /// Everything on except digest.
    fn default() -> Self {
        Self {
            assigned: true,
            due_soon: true,
            overdue: true,
            mention: true,
            digest: false,
        }
    }
}

impl ChannelPrefs {
    pub fn enabled_for(&self, kind: NotificationType) -> bool {
        match kind {
            NotificationType::Assigned => self.assigned,
            NotificationType::DueSoon => self.due_soon,
            NotificationType::Overdue => self.overdue,
            NotificationType::Mention => self.mention,
            NotificationType::Digest => self.digest,
        }
    }
}

/// A user's notification preference matrix.
///
/// Created lazily with defaults on first read, mutated only by explicit
/// user update, never deleted while the user exists. The in-app channel is
/// implicit and unconditionally on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub user_id: String,
    pub email: ChannelPrefs,
    pub webhook: ChannelPrefs,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    pub fn defaults_for(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            email: ChannelPrefs::default(),
            webhook: ChannelPrefs::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn channel(&self, channel: ChannelKind) -> &ChannelPrefs {
        match channel {
            ChannelKind::Email => &self.email,
            ChannelKind::Webhook => &self.webhook,
        }
    }
}

/// Partial preference update; `None` leaves the channel untouched.
#[derive(Debug, Clone, Default)]
pub struct PreferenceUpdate {
    pub email: Option<ChannelPrefs>,
    pub webhook: Option<ChannelPrefs>,
}

/// Durable in-app notification. Append-only; only `read` is ever flipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub kind: NotificationType,
    pub message: String,
    pub related_task_id: Option<Uuid>,
    pub related_project_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNotificationParams {
    pub user_id: String,
    pub kind: NotificationType,
    pub message: String,
    pub related_task_id: Option<Uuid>,
    pub related_project_id: Option<Uuid>,
}

// ==================== Sub-traits ====================

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Open tasks (`lifecycle != done`) with a due date set — the reminder
    /// scan candidates.
    async fn find_due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<TaskRecord>, StoreError>;

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError>;

    /// Open tasks assigned to a user, due date or not; drives summaries.
    async fn list_open_tasks_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<TaskRecord>, StoreError>;

    /// Users that currently have at least one open task assigned.
    async fn list_active_assignees(&self) -> Result<Vec<String>, StoreError>;

    /// Persist a recomputed cached due-date status.
    async fn update_task_status(
        &self,
        id: Uuid,
        status: DueDateStatus,
    ) -> Result<(), StoreError>;

    /// Versioned write of the reminder history. Returns `Ok(false)` when
    /// `expected_version` no longer matches (a concurrent writer won); the
    /// caller re-reads and retries. On success the row version increments.
    async fn update_task_reminders(
        &self,
        id: Uuid,
        expected_version: i64,
        fired: &BTreeSet<ReminderKind>,
        last_reminder_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Clear the fired set after a due-date change (the one sanctioned
    /// exception to append-only).
    async fn reset_fired_reminders(&self, id: Uuid) -> Result<(), StoreError>;

    /// Set or clear the snooze instant.
    async fn set_task_snooze(
        &self,
        id: Uuid,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Upsert-by-key: concurrent first access for the same user must yield
    /// one record, never duplicates.
    async fn get_or_create_preferences(
        &self,
        user_id: &str,
    ) -> Result<NotificationPreferences, StoreError>;

    async fn update_preferences(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<NotificationPreferences, StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(
        &self,
        params: &CreateNotificationParams,
    ) -> Result<NotificationRecord, StoreError>;

    /// Flip `read`. Returns `false` when the record does not exist.
    async fn mark_read(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list_notifications_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError>;
}

/// Backend-agnostic storage supertrait.
pub trait Store: TaskStore + PreferenceStore + NotificationStore + Send + Sync {}

impl<T: TaskStore + PreferenceStore + NotificationStore + Send + Sync> Store for T {}
