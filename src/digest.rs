//! Periodic digest summaries.
//!
//! Digests run on structured calendar schedules (daily or weekly at a
//! fixed UTC time) rather than cron pattern strings. The runner sleeps to
//! the earliest next fire time across its schedules, sends one digest per
//! active user, and repeats.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::notify::{NotificationDispatcher, NotifyEvent};
use crate::status;
use crate::store::{NotificationType, Store};

/// A fixed calendar trigger, always interpreted in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cadence", rename_all = "snake_case")]
pub enum DigestSchedule {
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
}

impl DigestSchedule {
    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or(NaiveTime::MIN)
    }

    /// The first fire instant strictly after `after`.
    pub fn next_fire(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::Daily { hour, minute } => {
                let candidate = Utc.from_utc_datetime(
                    &after.date_naive().and_time(Self::time(hour, minute)),
                );
                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::days(1)
                }
            }
            Self::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let days_ahead = (weekday.num_days_from_monday() + 7
                    - after.weekday().num_days_from_monday())
                    % 7;
                let candidate = Utc.from_utc_datetime(
                    &(after.date_naive() + Duration::days(i64::from(days_ahead)))
                        .and_time(Self::time(hour, minute)),
                );
                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
        }
    }
}

/// Sends a due-date digest to every active user when a schedule fires.
pub struct DigestRunner {
    store: Arc<dyn Store>,
    dispatcher: Arc<NotificationDispatcher>,
    schedules: Vec<DigestSchedule>,
}

impl DigestRunner {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<NotificationDispatcher>,
        schedules: Vec<DigestSchedule>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            schedules,
        }
    }

    /// One digest pass: a summary notification per active assignee. Users
    /// with nothing due are skipped.
    pub async fn run_once(&self, now: DateTime<Utc>) {
        let assignees = match self.store.list_active_assignees().await {
            Ok(assignees) => assignees,
            Err(error) => {
                error!(%error, "digest pass skipped");
                return;
            }
        };
        for user_id in assignees {
            let tasks = match self.store.list_open_tasks_for_user(&user_id).await {
                Ok(tasks) => tasks,
                Err(error) => {
                    warn!(user_id, %error, "digest query failed, continuing");
                    continue;
                }
            };
            let summary = status::summarize(tasks.iter(), now);
            if summary.overdue + summary.due_today + summary.due_soon == 0 {
                continue;
            }
            let message = format!(
                "Due-date digest: {} overdue, {} due today, {} due soon",
                summary.overdue, summary.due_today, summary.due_soon
            );
            if let Err(error) = self
                .dispatcher
                .dispatch(NotifyEvent::new(&user_id, NotificationType::Digest, message))
                .await
            {
                warn!(user_id, %error, "digest dispatch lost");
            }
        }
    }

    fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .map(|schedule| schedule.next_fire(after))
            .min()
    }

    /// Start the background loop. Does nothing when no schedules are
    /// configured.
    pub fn spawn(self: Arc<Self>) -> DigestHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let runner = self;
        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = runner.next_fire(now) else {
                    info!("no digest schedules configured");
                    return;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        info!(fired_at = %next, "digest schedule fired");
                        runner.run_once(Utc::now()).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("digest runner stopping");
                            break;
                        }
                    }
                }
            }
        });
        DigestHandle { shutdown_tx, handle }
    }
}

pub struct DigestHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DigestHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::EventRouter;
    use crate::notify::{DeliveryPool, PreferenceResolver};
    use crate::store::memory::MemoryStore;
    use crate::store::TaskRecord;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn daily_fires_later_today_or_tomorrow() {
        let schedule = DigestSchedule::Daily { hour: 8, minute: 0 };
        assert_eq!(
            schedule.next_fire(at(2026, 3, 10, 6, 0)),
            at(2026, 3, 10, 8, 0)
        );
        assert_eq!(
            schedule.next_fire(at(2026, 3, 10, 8, 0)),
            at(2026, 3, 11, 8, 0)
        );
    }

    #[test]
    fn weekly_wraps_to_the_next_occurrence() {
        let schedule = DigestSchedule::Weekly {
            weekday: Weekday::Mon,
            hour: 8,
            minute: 0,
        };
        // 2026-03-10 is a Tuesday.
        assert_eq!(
            schedule.next_fire(at(2026, 3, 10, 12, 0)),
            at(2026, 3, 16, 8, 0)
        );
        // Monday before 08:00 fires the same day.
        assert_eq!(
            schedule.next_fire(at(2026, 3, 16, 6, 0)),
            at(2026, 3, 16, 8, 0)
        );
        // Monday at exactly 08:00 waits a full week.
        assert_eq!(
            schedule.next_fire(at(2026, 3, 16, 8, 0)),
            at(2026, 3, 23, 8, 0)
        );
    }

    #[tokio::test]
    async fn digest_pass_skips_users_with_nothing_due() {
        let store = Arc::new(MemoryStore::new());
        let router = Arc::new(EventRouter::new());
        let resolver = Arc::new(PreferenceResolver::new(store.clone()));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            resolver,
            router,
            Vec::new(),
            DeliveryPool::spawn(8, 1),
        ));
        let runner = DigestRunner::new(store.clone(), dispatcher, Vec::new());

        let now = at(2026, 3, 10, 8, 0);
        let mut busy = TaskRecord::new("overdue thing", now);
        busy.due_at = Some(now - Duration::hours(4));
        busy.assignee = Some("ada".to_string());
        store.upsert_task(busy).await;
        let mut idle = TaskRecord::new("someday", now);
        idle.assignee = Some("bob".to_string());
        store.upsert_task(idle).await;

        runner.run_once(now).await;

        let records = store.all_notifications().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, "ada");
        assert_eq!(records[0].kind, NotificationType::Digest);
        assert!(records[0].message.contains("1 overdue"));
    }
}
