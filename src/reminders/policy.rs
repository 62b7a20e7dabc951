//! Reminder eligibility policy.
//!
//! Pure predicate; the scheduler owns all state mutation. The time windows
//! are deliberately wide (±1h around the 24h mark, ±15m around the 1h mark)
//! so a 15-minute polling interval cannot straddle past a window without
//! observing it.

use chrono::{DateTime, Duration, Utc};

use crate::store::{ReminderKind, TaskLifecycle, TaskRecord};

/// Whether `kind` is eligible to fire for `task` at `now`.
///
/// Requires a due date, an open lifecycle, no prior firing of this kind,
/// a lapsed (or absent) snooze, and the kind-specific window test.
pub fn is_eligible(task: &TaskRecord, kind: ReminderKind, now: DateTime<Utc>) -> bool {
    let Some(due_at) = task.due_at else {
        return false;
    };
    if task.lifecycle == TaskLifecycle::Done {
        return false;
    }
    if task.fired_reminder_kinds.contains(&kind) {
        return false;
    }
    if let Some(snoozed_until) = task.snoozed_until {
        if now < snoozed_until {
            return false;
        }
    }
    in_window(due_at, kind, now)
}

fn in_window(due_at: DateTime<Utc>, kind: ReminderKind, now: DateTime<Utc>) -> bool {
    match kind {
        ReminderKind::Overdue => due_at < now,
        ReminderKind::DueIn24h => {
            due_at >= now + Duration::hours(23) && due_at <= now + Duration::hours(25)
        }
        ReminderKind::DueIn1h => {
            due_at >= now + Duration::minutes(45) && due_at <= now + Duration::minutes(75)
        }
        ReminderKind::DueToday => due_at.date_naive() == now.date_naive(),
    }
}

/// All kinds eligible for `task` at `now`, in the fixed scheduler order.
pub fn eligible_kinds(task: &TaskRecord, now: DateTime<Utc>) -> Vec<ReminderKind> {
    ReminderKind::ALL
        .into_iter()
        .filter(|kind| is_eligible(task, *kind, now))
        .collect()
}
