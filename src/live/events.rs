//! Wire-level live events.
//!
//! Tagged enum serialized as `{"type": "...", ...}`. Payloads carry the
//! minimal changed-field set plus the entity id; `task_created` and
//! `task_updated` carry the full task snapshot since subscribers render
//! them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::DueDateSummary;
use crate::store::{NotificationRecord, TaskLifecycle, TaskRecord};

/// A named channel of interest that connections subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Per-user events: notifications, due-date summaries.
    User(String),
    /// Per-project events: the task change family.
    Project(Uuid),
    /// Per-chat-channel events: typing indicators.
    Channel(String),
    /// Presence transitions, visible to everyone connected.
    Global,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Project(id) => write!(f, "project:{id}"),
            Self::Channel(id) => write!(f, "channel:{id}"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Observer liveness classification carried on presence events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Online,
    Away,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    TaskCreated {
        task: TaskRecord,
    },
    TaskUpdated {
        task: TaskRecord,
    },
    TaskDeleted {
        task_id: Uuid,
    },
    TaskMoved {
        task_id: Uuid,
        lifecycle: TaskLifecycle,
    },
    TaskDueDateChanged {
        task_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        due_at: Option<DateTime<Utc>>,
        has_time_component: bool,
    },
    NotificationCreated {
        notification: NotificationRecord,
    },
    DueDateSummaryUpdated {
        user_id: String,
        summary: DueDateSummary,
    },
    TypingStarted {
        channel_id: String,
        user_id: String,
    },
    TypingStopped {
        channel_id: String,
        user_id: String,
    },
    PresenceChanged {
        observer_id: String,
        state: PresenceState,
    },
}
