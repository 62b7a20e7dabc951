//! The periodic reminder scan.
//!
//! Every tick: load candidate tasks, fire eligible reminder kinds through
//! the dispatcher, persist the fired history with an optimistic version
//! check, recompute the cached due-date status, then broadcast per-user
//! due-date summaries. A failure in one task never aborts the scan, and a
//! failed tick never prevents the next one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::live::{EventRouter, LiveEvent, Topic};
use crate::notify::{NotificationDispatcher, NotifyEvent};
use crate::reminders::policy;
use crate::status;
use crate::store::{NotificationType, ReminderKind, Store, TaskRecord};

pub struct ReminderScheduler {
    store: Arc<dyn Store>,
    dispatcher: Arc<NotificationDispatcher>,
    router: Arc<EventRouter>,
    interval: std::time::Duration,
}

impl ReminderScheduler {
    pub fn from_config(
        store: Arc<dyn Store>,
        dispatcher: Arc<NotificationDispatcher>,
        router: Arc<EventRouter>,
        config: &crate::config::SchedulerConfig,
    ) -> Self {
        Self::new(store, dispatcher, router, config.tick_interval())
    }

    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<NotificationDispatcher>,
        router: Arc<EventRouter>,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            router,
            interval,
        }
    }

    /// Run one full scan at `now`. Infallible by contract: every failure
    /// path is logged and contained.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let tasks = match self.store.find_due_tasks(now).await {
            Ok(tasks) => tasks,
            Err(error) => {
                error!(%error, "reminder scan query failed, skipping tick");
                return;
            }
        };
        debug!(candidates = tasks.len(), "reminder scan");

        for task in &tasks {
            if let Err(error) = self.process_task(task, now).await {
                error!(task_id = %task.id, %error, "task processing failed, continuing scan");
            }
        }

        self.broadcast_summaries(now).await;
    }

    /// Fire eligible reminder kinds for one task, then refresh its cached
    /// status.
    async fn process_task(&self, task: &TaskRecord, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut current = task.clone();

        for kind in ReminderKind::ALL {
            if !policy::is_eligible(&current, kind, now) {
                continue;
            }
            let Some(assignee) = current.assignee.clone() else {
                // Nobody to notify; leave the kind unfired in case the
                // task is assigned later.
                continue;
            };
            if let Err(error) = self
                .dispatcher
                .dispatch(self.reminder_event(&current, kind, &assignee))
                .await
            {
                warn!(task_id = %current.id, kind = kind.as_str(), %error, "reminder dispatch lost");
                continue;
            }
            self.mark_fired(&mut current, kind, now).await?;
        }

        let computed = status::classify_task(&current, now);
        if computed != current.due_date_status {
            self.store.update_task_status(current.id, computed).await?;
        }
        Ok(())
    }

    /// Append `kind` to the fired set with a versioned write. On conflict,
    /// re-read and retry once; a second conflict skips the kind for this
    /// tick (it was never marked fired, so the next tick re-evaluates it).
    async fn mark_fired(
        &self,
        current: &mut TaskRecord,
        kind: ReminderKind,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut fired = current.fired_reminder_kinds.clone();
        fired.insert(kind);
        if self
            .store
            .update_task_reminders(current.id, current.version, &fired, now)
            .await?
        {
            current.fired_reminder_kinds = fired;
            current.last_reminder_at = Some(now);
            current.version += 1;
            return Ok(());
        }

        let Some(fresh) = self.store.get_task(current.id).await? else {
            return Ok(());
        };
        *current = fresh;
        if current.fired_reminder_kinds.contains(&kind) {
            // A concurrent writer already fired it.
            return Ok(());
        }
        let mut fired = current.fired_reminder_kinds.clone();
        fired.insert(kind);
        if self
            .store
            .update_task_reminders(current.id, current.version, &fired, now)
            .await?
        {
            current.fired_reminder_kinds = fired;
            current.last_reminder_at = Some(now);
            current.version += 1;
        } else {
            warn!(task_id = %current.id, kind = kind.as_str(), "version conflict twice, deferring to next tick");
        }
        Ok(())
    }

    fn reminder_event(&self, task: &TaskRecord, kind: ReminderKind, assignee: &str) -> NotifyEvent {
        let message = match kind {
            ReminderKind::Overdue => format!("\"{}\" is overdue", task.title),
            ReminderKind::DueIn24h => format!("\"{}\" is due in about 24 hours", task.title),
            ReminderKind::DueIn1h => format!("\"{}\" is due within the hour", task.title),
            ReminderKind::DueToday => format!("\"{}\" is due today", task.title),
        };
        let notification_type = match kind {
            ReminderKind::Overdue => NotificationType::Overdue,
            _ => NotificationType::DueSoon,
        };
        let mut event = NotifyEvent::new(assignee, notification_type, message).with_task(task.id);
        if let Some(project_id) = task.project_id {
            event = event.with_project(project_id);
        }
        event
    }

    /// Recompute and broadcast each active user's due-date summary.
    async fn broadcast_summaries(&self, now: DateTime<Utc>) {
        let assignees = match self.store.list_active_assignees().await {
            Ok(assignees) => assignees,
            Err(error) => {
                warn!(%error, "summary broadcast skipped");
                return;
            }
        };
        for user_id in assignees {
            match self.store.list_open_tasks_for_user(&user_id).await {
                Ok(tasks) => {
                    let summary = status::summarize(tasks.iter(), now);
                    self.router.publish(
                        &Topic::User(user_id.clone()),
                        &LiveEvent::DueDateSummaryUpdated { user_id, summary },
                    );
                }
                Err(error) => {
                    warn!(user_id, %error, "summary query failed, continuing");
                }
            }
        }
    }

    /// Start the periodic loop. Stops scheduling new ticks on shutdown;
    /// an in-flight tick runs to completion.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately.
            ticker.tick().await;
            info!(interval_secs = scheduler.interval.as_secs(), "reminder scheduler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.tick(Utc::now()).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("reminder scheduler stopping");
                            break;
                        }
                    }
                }
            }
        });
        SchedulerHandle { shutdown_tx, handle }
    }
}

/// Handle for stopping the scheduler loop.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}
