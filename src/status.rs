//! Due-date status classification.
//!
//! Pure date arithmetic over an injected `now`; no clock reads, no I/O.
//! The scheduler and the mutation path both run the classifier and persist
//! the result into the task's cached `due_date_status` column.

use chrono::{DateTime, Duration, Utc};

use crate::store::{DueDateStatus, TaskLifecycle, TaskRecord};

/// Tasks due within this horizon (but not today) classify as `DueSoon`.
pub const DUE_SOON_HORIZON_HOURS: i64 = 72;

/// Classify a task's urgency. Rules in order, first match wins:
/// done, no due date, past due, due within today's calendar day, due
/// within the 72h horizon, otherwise on track.
pub fn classify(
    due_at: Option<DateTime<Utc>>,
    lifecycle: TaskLifecycle,
    now: DateTime<Utc>,
) -> DueDateStatus {
    if lifecycle == TaskLifecycle::Done {
        return DueDateStatus::Completed;
    }
    let Some(due_at) = due_at else {
        return DueDateStatus::None;
    };
    if due_at < now {
        return DueDateStatus::Overdue;
    }
    if due_at.date_naive() == now.date_naive() {
        return DueDateStatus::DueToday;
    }
    if due_at < now + Duration::hours(DUE_SOON_HORIZON_HOURS) {
        return DueDateStatus::DueSoon;
    }
    DueDateStatus::OnTrack
}

/// Convenience over a stored row.
pub fn classify_task(task: &TaskRecord, now: DateTime<Utc>) -> DueDateStatus {
    classify(task.due_at, task.lifecycle, now)
}

/// Per-user counts by status, broadcast after each scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DueDateSummary {
    pub overdue: usize,
    pub due_today: usize,
    pub due_soon: usize,
    pub on_track: usize,
}

/// Tally the open tasks of one user into a summary. Tasks without a due
/// date and completed tasks contribute nothing.
pub fn summarize<'a>(
    tasks: impl IntoIterator<Item = &'a TaskRecord>,
    now: DateTime<Utc>,
) -> DueDateSummary {
    let mut summary = DueDateSummary::default();
    for task in tasks {
        match classify_task(task, now) {
            DueDateStatus::Overdue => summary.overdue += 1,
            DueDateStatus::DueToday => summary.due_today += 1,
            DueDateStatus::DueSoon => summary.due_soon += 1,
            DueDateStatus::OnTrack => summary.on_track += 1,
            DueDateStatus::None | DueDateStatus::Completed => {}
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn done_wins_over_everything() {
        let now = at(12, 0);
        assert_eq!(
            classify(Some(now - Duration::days(30)), TaskLifecycle::Done, now),
            DueDateStatus::Completed
        );
        assert_eq!(
            classify(None, TaskLifecycle::Done, now),
            DueDateStatus::Completed
        );
    }

    #[test]
    fn missing_due_date_is_none() {
        assert_eq!(
            classify(None, TaskLifecycle::InProgress, at(12, 0)),
            DueDateStatus::None
        );
    }

    #[test]
    fn one_second_past_due_is_overdue() {
        let now = at(12, 0);
        assert_eq!(
            classify(Some(now - Duration::seconds(1)), TaskLifecycle::Todo, now),
            DueDateStatus::Overdue
        );
    }

    #[test]
    fn one_second_ahead_same_day_is_due_today() {
        let now = at(12, 0);
        assert_eq!(
            classify(Some(now + Duration::seconds(1)), TaskLifecycle::Todo, now),
            DueDateStatus::DueToday
        );
        // Still today at 23:59.
        assert_eq!(
            classify(Some(at(23, 59)), TaskLifecycle::Todo, now),
            DueDateStatus::DueToday
        );
    }

    #[test]
    fn tomorrow_within_horizon_is_due_soon() {
        let now = at(12, 0);
        assert_eq!(
            classify(Some(now + Duration::hours(36)), TaskLifecycle::Todo, now),
            DueDateStatus::DueSoon
        );
        assert_eq!(
            classify(
                Some(now + Duration::hours(DUE_SOON_HORIZON_HOURS) - Duration::seconds(1)),
                TaskLifecycle::Todo,
                now
            ),
            DueDateStatus::DueSoon
        );
    }

    #[test]
    fn beyond_horizon_is_on_track() {
        let now = at(12, 0);
        assert_eq!(
            classify(Some(now + Duration::hours(100)), TaskLifecycle::Todo, now),
            DueDateStatus::OnTrack
        );
    }

    #[test]
    fn total_over_all_lifecycles() {
        let now = at(12, 0);
        for lifecycle in [
            TaskLifecycle::Todo,
            TaskLifecycle::InProgress,
            TaskLifecycle::InReview,
            TaskLifecycle::Done,
        ] {
            for due in [None, Some(now - Duration::days(1)), Some(now + Duration::days(10))] {
                // Must always produce a value; the match below is exhaustive.
                let _ = classify(due, lifecycle, now);
            }
        }
    }

    #[test]
    fn summary_counts_by_status() {
        let now = at(12, 0);
        let mut overdue = TaskRecord::new("a", now);
        overdue.due_at = Some(now - Duration::hours(2));
        let mut today = TaskRecord::new("b", now);
        today.due_at = Some(now + Duration::hours(3));
        let mut soon = TaskRecord::new("c", now);
        soon.due_at = Some(now + Duration::hours(40));
        let mut far = TaskRecord::new("d", now);
        far.due_at = Some(now + Duration::days(10));
        let undated = TaskRecord::new("e", now);

        let summary = summarize([&overdue, &today, &soon, &far, &undated], now);
        assert_eq!(
            summary,
            DueDateSummary {
                overdue: 1,
                due_today: 1,
                due_soon: 1,
                on_track: 1,
            }
        );
    }
}
