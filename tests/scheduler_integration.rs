//! End-to-end reminder flow over the in-memory backend: the scheduler,
//! dispatcher, router, and service assembled the way an embedding would
//! wire them.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use uuid::Uuid;

use duepulse::error::{ChannelError, StoreError};
use duepulse::live::{ConnectionId, EventRouter, LiveEvent, Topic};
use duepulse::notify::{
    ChannelDelivery, DeliveryPool, NotificationChannel, NotificationDispatcher,
    PreferenceResolver,
};
use duepulse::reminders::ReminderScheduler;
use duepulse::service::{ReminderService, TaskMutation};
use duepulse::store::memory::MemoryStore;
use duepulse::store::{
    ChannelKind, CreateNotificationParams, DueDateStatus, NotificationPreferences,
    NotificationRecord, NotificationStore, PreferenceStore, PreferenceUpdate, ReminderKind,
    TaskStore,
};

fn base_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
}

struct FlakyChannel {
    attempts: AtomicUsize,
}

#[async_trait]
impl NotificationChannel for FlakyChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, _delivery: &ChannelDelivery) -> Result<(), ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ChannelError::SendFailed {
            channel: "email",
            reason: "relay refused connection".to_string(),
        })
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    router: Arc<EventRouter>,
    scheduler: ReminderScheduler,
    service: ReminderService,
    email_attempts: Arc<FlakyChannel>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let router = Arc::new(EventRouter::new());
    let presence = Arc::new(duepulse::live::PresenceTracker::new(router.clone()));
    let resolver = Arc::new(PreferenceResolver::new(store.clone()));
    let email = Arc::new(FlakyChannel {
        attempts: AtomicUsize::new(0),
    });
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        resolver.clone(),
        router.clone(),
        vec![email.clone()],
        DeliveryPool::spawn(16, 2),
    ));
    let scheduler = ReminderScheduler::new(
        store.clone(),
        dispatcher.clone(),
        router.clone(),
        std::time::Duration::from_secs(900),
    );
    let service = ReminderService::new(
        store.clone(),
        router.clone(),
        presence,
        dispatcher,
        resolver,
    );
    Harness {
        store,
        router,
        scheduler,
        service,
        email_attempts: email,
    }
}

async fn seed(
    store: &MemoryStore,
    now: DateTime<Utc>,
    due_in: Duration,
) -> duepulse::store::TaskRecord {
    let mut task = duepulse::store::TaskRecord::new("quarterly report", now);
    task.due_at = Some(now + due_in);
    task.assignee = Some("ada".to_string());
    task.project_id = Some(Uuid::new_v4());
    store.upsert_task(task.clone()).await;
    task
}

fn subscribe_user(router: &EventRouter, user: &str) -> mpsc::UnboundedReceiver<LiveEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    router.subscribe(Topic::User(user.to_string()), ConnectionId::new(), tx);
    rx
}

#[tokio::test]
async fn reminder_reaches_live_subscriber_and_never_refires() {
    let h = harness();
    let now = base_now();
    let task = seed(&h.store, now, Duration::hours(24) + Duration::minutes(5)).await;
    let mut rx = subscribe_user(&h.router, "ada");

    h.scheduler.tick(now).await;

    let stored = h.store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(
        stored.fired_reminder_kinds,
        BTreeSet::from([ReminderKind::DueIn24h])
    );
    assert_eq!(stored.last_reminder_at, Some(now));

    // First the durable record's live publish, then the summary broadcast.
    match rx.try_recv().unwrap() {
        LiveEvent::NotificationCreated { notification } => {
            assert_eq!(notification.user_id, "ada");
            assert!(notification.message.contains("due in about 24 hours"));
            let wire = serde_json::to_value(&LiveEvent::NotificationCreated { notification }).unwrap();
            assert_eq!(wire["type"], "notification_created");
        }
        other => panic!("expected notification, got {other:?}"),
    }
    match rx.try_recv().unwrap() {
        LiveEvent::DueDateSummaryUpdated { user_id, summary } => {
            assert_eq!(user_id, "ada");
            assert_eq!(summary.due_soon, 1);
        }
        other => panic!("expected summary, got {other:?}"),
    }

    // Re-running at the same instant and shortly after fires nothing new.
    h.scheduler.tick(now).await;
    h.scheduler.tick(now + Duration::minutes(10)).await;
    assert_eq!(h.store.all_notifications().await.len(), 1);
}

#[tokio::test]
async fn one_hour_kind_fires_independently_of_the_24h_kind() {
    let h = harness();
    let now = base_now();
    let task = seed(&h.store, now, Duration::hours(24) + Duration::minutes(5)).await;

    h.scheduler.tick(now).await;
    h.scheduler
        .tick(now + Duration::hours(23) + Duration::minutes(10))
        .await;

    let stored = h.store.get_task(task.id).await.unwrap().unwrap();
    assert!(stored.fired_reminder_kinds.contains(&ReminderKind::DueIn24h));
    assert!(stored.fired_reminder_kinds.contains(&ReminderKind::DueIn1h));
}

#[tokio::test]
async fn failing_email_channel_loses_nothing_durable() {
    let h = harness();
    let now = base_now();
    seed(&h.store, now, Duration::hours(-1)).await;
    let mut rx = subscribe_user(&h.router, "ada");

    h.scheduler.tick(now).await;

    // Overdue fired (due_today too, same calendar day): two records, each
    // with exactly one live publish, email attempted and failed for both.
    let records = h.store.all_notifications().await;
    assert_eq!(records.len(), 2);
    let live: Vec<LiveEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    let notifications = live
        .iter()
        .filter(|e| matches!(e, LiveEvent::NotificationCreated { .. }))
        .count();
    assert_eq!(notifications, 2);
}

#[tokio::test]
async fn snooze_blocks_firing_until_it_lapses() -> anyhow::Result<()> {
    let h = harness();
    let now = base_now();
    let task = seed(&h.store, now, Duration::minutes(-30)).await;
    h.service
        .snooze_task(task.id, Some(now + Duration::hours(1)))
        .await?;

    h.scheduler.tick(now).await;
    assert!(h.store.all_notifications().await.is_empty());

    h.scheduler.tick(now + Duration::hours(1)).await;
    let stored = h.store.get_task(task.id).await?.expect("task exists");
    assert!(stored.fired_reminder_kinds.contains(&ReminderKind::Overdue));
    Ok(())
}

#[tokio::test]
async fn due_date_edit_re_arms_fired_kinds() -> anyhow::Result<()> {
    let h = harness();
    let now = base_now();
    let mut task = seed(&h.store, now, Duration::minutes(-30)).await;

    h.scheduler.tick(now).await;
    let fired = h
        .store
        .get_task(task.id)
        .await?
        .expect("task exists")
        .fired_reminder_kinds;
    assert!(fired.contains(&ReminderKind::Overdue));
    let after_first = h.store.all_notifications().await.len();

    // Push the deadline out, report the mutation, then let it lapse again.
    task.due_at = Some(now + Duration::hours(2));
    h.store.upsert_task(task.clone()).await;
    h.service
        .on_task_mutated(&task, TaskMutation::DueDateChanged, now)
        .await?;
    assert!(h
        .store
        .get_task(task.id)
        .await?
        .expect("task exists")
        .fired_reminder_kinds
        .is_empty());

    h.scheduler.tick(now + Duration::hours(3)).await;
    let stored = h.store.get_task(task.id).await?.expect("task exists");
    assert!(stored.fired_reminder_kinds.contains(&ReminderKind::Overdue));
    assert!(h.store.all_notifications().await.len() > after_first);
    Ok(())
}

#[tokio::test]
async fn email_failures_are_contained_to_the_worker_pool() {
    let h = harness();
    let now = base_now();
    seed(&h.store, now, Duration::hours(24)).await;

    h.scheduler.tick(now).await;
    // Give the delivery workers a beat to drain.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(h.email_attempts.attempts.load(Ordering::SeqCst) >= 1);
    assert_eq!(h.store.all_notifications().await.len(), 1);
}

// ---- optimistic-concurrency behavior under a contending writer ----

/// Store wrapper whose first versioned reminder write reports a conflict.
struct ConflictOnce {
    inner: Arc<MemoryStore>,
    conflicted: AtomicBool,
}

#[async_trait]
impl TaskStore for ConflictOnce {
    async fn find_due_tasks(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<duepulse::store::TaskRecord>, StoreError> {
        self.inner.find_due_tasks(now).await
    }

    async fn get_task(
        &self,
        id: Uuid,
    ) -> Result<Option<duepulse::store::TaskRecord>, StoreError> {
        self.inner.get_task(id).await
    }

    async fn list_open_tasks_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<duepulse::store::TaskRecord>, StoreError> {
        self.inner.list_open_tasks_for_user(user_id).await
    }

    async fn list_active_assignees(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_active_assignees().await
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        status: DueDateStatus,
    ) -> Result<(), StoreError> {
        self.inner.update_task_status(id, status).await
    }

    async fn update_task_reminders(
        &self,
        id: Uuid,
        expected_version: i64,
        fired: &BTreeSet<ReminderKind>,
        last_reminder_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if !self.conflicted.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner
            .update_task_reminders(id, expected_version, fired, last_reminder_at)
            .await
    }

    async fn reset_fired_reminders(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.reset_fired_reminders(id).await
    }

    async fn set_task_snooze(
        &self,
        id: Uuid,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.inner.set_task_snooze(id, until).await
    }
}

#[async_trait]
impl PreferenceStore for ConflictOnce {
    async fn get_or_create_preferences(
        &self,
        user_id: &str,
    ) -> Result<NotificationPreferences, StoreError> {
        self.inner.get_or_create_preferences(user_id).await
    }

    async fn update_preferences(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<NotificationPreferences, StoreError> {
        self.inner.update_preferences(user_id, update).await
    }
}

#[async_trait]
impl NotificationStore for ConflictOnce {
    async fn create_notification(
        &self,
        params: &CreateNotificationParams,
    ) -> Result<NotificationRecord, StoreError> {
        self.inner.create_notification(params).await
    }

    async fn mark_read(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.mark_read(id).await
    }

    async fn list_notifications_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        self.inner.list_notifications_for_user(user_id, limit).await
    }
}

#[tokio::test]
async fn version_conflict_is_retried_once_and_succeeds() {
    let inner = Arc::new(MemoryStore::new());
    let store = Arc::new(ConflictOnce {
        inner: inner.clone(),
        conflicted: AtomicBool::new(false),
    });
    let router = Arc::new(EventRouter::new());
    let resolver = Arc::new(PreferenceResolver::new(store.clone()));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        resolver,
        router.clone(),
        Vec::new(),
        DeliveryPool::spawn(8, 1),
    ));
    let scheduler = ReminderScheduler::new(
        store,
        dispatcher,
        router,
        std::time::Duration::from_secs(900),
    );

    let now = base_now();
    let task = seed(&inner, now, Duration::minutes(-5)).await;
    scheduler.tick(now).await;

    let stored = inner.get_task(task.id).await.unwrap().unwrap();
    assert!(stored.fired_reminder_kinds.contains(&ReminderKind::Overdue));
    // due_today also fired on the retry path's later iteration.
    assert!(stored.fired_reminder_kinds.contains(&ReminderKind::DueToday));
}
