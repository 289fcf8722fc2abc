//! Recurring-task scheduling.
//!
//! Keeps exactly one upcoming incomplete task per scheduled appliance. The
//! decision is a pure function of the appliance, its task history and the
//! current date ([`plan`]); [`ensure_future_task`] loads the history from the
//! store and persists whatever the plan asks for.
//!
//! Callers must hold the write gate with a transaction open, so that no other
//! unit of work observes or changes this appliance's tasks concurrently.

use chrono::{Datelike, Days, NaiveDate};
use tracing::{debug, info};

use crate::appliances::model::{Appliance, CleaningTask};
use crate::error::ServiceError;
use crate::store::Database;

/// What the scheduler knows about an appliance's past.
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Incomplete tasks, by due date ascending.
    pub incomplete: Vec<CleaningTask>,
    /// Calendar date of the most recent completion.
    pub last_completion: Option<NaiveDate>,
    /// Latest due date across all tasks, completed or not.
    pub latest_due: Option<NaiveDate>,
}

/// Outcome of a scheduling pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    /// The appliance has no interval.
    Unscheduled,
    /// An upcoming task already exists.
    Existing(CleaningTask),
    /// A new task must be created with this due date.
    Create { due_date: NaiveDate },
}

/// Decide whether the appliance needs a new task and when it is due.
pub fn plan(
    appliance: &Appliance,
    history: &History,
    today: NaiveDate,
) -> Result<Schedule, ServiceError> {
    let Some(interval) = appliance.interval() else {
        return Ok(Schedule::Unscheduled);
    };

    // Incomplete tasks arrive ordered by due date, so the first upcoming
    // one is the earliest.
    if let Some(upcoming) = history.incomplete.iter().find(|t| t.is_upcoming(today)) {
        return Ok(Schedule::Existing(upcoming.clone()));
    }

    // Both bounds apply: late completion pushes past the last due date, a
    // lowered interval must still land after it.
    let base = match (history.last_completion, history.latest_due) {
        (Some(done), Some(due)) => done.max(due),
        (Some(done), None) => done,
        (None, Some(due)) => due,
        (None, None) => appliance.created_at.date_naive(),
    };

    Ok(Schedule::Create {
        due_date: days_after(base, interval)?,
    })
}

/// Due dates are stored as fixed-width `YYYY-MM-DD` text.
const MAX_DUE_YEAR: i32 = 9999;

/// `date + days`, rejecting due dates that cannot be stored.
pub fn days_after(date: NaiveDate, days: u32) -> Result<NaiveDate, ServiceError> {
    date.checked_add_days(Days::new(u64::from(days)))
        .filter(|due| due.year() <= MAX_DUE_YEAR)
        .ok_or_else(|| {
            ServiceError::Validation(format!("due date {date} + {days} days is out of range"))
        })
}

/// Load an appliance's task history from the store.
pub async fn load_history(
    db: &dyn Database,
    appliance_id: i64,
) -> Result<History, ServiceError> {
    let incomplete = db.list_incomplete_tasks(appliance_id).await?;
    let last_completion = db
        .latest_completed_task(appliance_id)
        .await?
        .and_then(|t| t.completed_at)
        .map(|at| at.date_naive());
    let latest_due = db
        .latest_due_task(appliance_id)
        .await?
        .map(|t| t.due_date);

    Ok(History {
        incomplete,
        last_completion,
        latest_due,
    })
}

/// Make sure a scheduled appliance has one upcoming incomplete task.
///
/// Returns the upcoming task (existing or newly created), or `None` when
/// the appliance has no interval. Creates at most one task and never
/// modifies existing ones.
pub async fn ensure_future_task(
    db: &dyn Database,
    appliance: &Appliance,
    today: NaiveDate,
) -> Result<Option<CleaningTask>, ServiceError> {
    if appliance.interval().is_none() {
        return Ok(None);
    }

    let history = load_history(db, appliance.id).await?;
    match plan(appliance, &history, today)? {
        Schedule::Unscheduled => Ok(None),
        Schedule::Existing(task) => {
            debug!(appliance_id = appliance.id, task_id = task.id, "Upcoming task already scheduled");
            Ok(Some(task))
        }
        Schedule::Create { due_date } => {
            let task = db.insert_task(appliance.id, due_date).await?;
            info!(
                appliance_id = appliance.id,
                task_id = task.id,
                due_date = %due_date,
                "Cleaning task scheduled"
            );
            Ok(Some(task))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::store::LibSqlBackend;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn noon(day: NaiveDate) -> DateTime<Utc> {
        day.and_hms_opt(12, 0, 0).unwrap().and_utc()
    }

    fn appliance(interval: Option<u32>, created: NaiveDate) -> Appliance {
        Appliance {
            id: 7,
            name: "Cat Fountain".into(),
            cleaning_interval_days: interval,
            created_at: noon(created),
        }
    }

    fn open_task(id: i64, due: NaiveDate) -> CleaningTask {
        CleaningTask {
            id,
            appliance_id: 7,
            due_date: due,
            completed: false,
            completed_at: None,
        }
    }

    // ── Pure planning ───────────────────────────────────────────────

    #[test]
    fn no_interval_is_unscheduled() {
        let today = date(2026, 5, 1);
        let history = History::default();
        for interval in [None, Some(0)] {
            let schedule = plan(&appliance(interval, today), &history, today).unwrap();
            assert_eq!(schedule, Schedule::Unscheduled);
        }
    }

    #[test]
    fn fresh_appliance_is_due_interval_after_creation() {
        let created = date(2026, 5, 1);
        let schedule = plan(&appliance(Some(7), created), &History::default(), created).unwrap();
        assert_eq!(
            schedule,
            Schedule::Create {
                due_date: date(2026, 5, 8)
            }
        );
    }

    #[test]
    fn earliest_upcoming_task_is_reused() {
        let today = date(2026, 5, 10);
        let history = History {
            incomplete: vec![
                open_task(1, date(2026, 5, 3)),
                open_task(2, date(2026, 5, 10)),
                open_task(3, date(2026, 5, 17)),
            ],
            last_completion: None,
            latest_due: Some(date(2026, 5, 17)),
        };

        let schedule = plan(&appliance(Some(7), date(2026, 4, 26)), &history, today).unwrap();
        assert_eq!(schedule, Schedule::Existing(open_task(2, date(2026, 5, 10))));
    }

    #[test]
    fn overdue_task_does_not_count_as_upcoming() {
        let today = date(2026, 5, 10);
        let history = History {
            incomplete: vec![open_task(1, date(2026, 5, 3))],
            last_completion: None,
            latest_due: Some(date(2026, 5, 3)),
        };

        let schedule = plan(&appliance(Some(7), date(2026, 4, 26)), &history, today).unwrap();
        assert_eq!(
            schedule,
            Schedule::Create {
                due_date: date(2026, 5, 10)
            }
        );
    }

    #[test]
    fn late_completion_moves_base_forward() {
        let history = History {
            incomplete: vec![],
            last_completion: Some(date(2026, 5, 20)),
            latest_due: Some(date(2026, 5, 8)),
        };

        let schedule = plan(
            &appliance(Some(7), date(2026, 5, 1)),
            &history,
            date(2026, 5, 20),
        )
        .unwrap();
        assert_eq!(
            schedule,
            Schedule::Create {
                due_date: date(2026, 5, 27)
            }
        );
    }

    #[test]
    fn early_completion_still_lands_after_last_due_date() {
        // Completed on the 3rd, while the task was due on the 8th.
        let history = History {
            incomplete: vec![],
            last_completion: Some(date(2026, 5, 3)),
            latest_due: Some(date(2026, 5, 8)),
        };

        let schedule = plan(
            &appliance(Some(7), date(2026, 5, 1)),
            &history,
            date(2026, 5, 3),
        )
        .unwrap();
        assert_eq!(
            schedule,
            Schedule::Create {
                due_date: date(2026, 5, 15)
            }
        );
    }

    #[test]
    fn out_of_range_due_date_is_a_validation_error() {
        let err = days_after(date(9999, 12, 20), 30).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(days_after(NaiveDate::MAX, 1).is_err());
        assert_eq!(days_after(date(9999, 12, 20), 11).unwrap(), date(9999, 12, 31));
    }

    // ── Against the store ───────────────────────────────────────────

    #[tokio::test]
    async fn ensure_creates_once_and_is_idempotent() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let today = date(2026, 5, 1);
        let a = db
            .insert_appliance("Washer", Some(14), noon(today))
            .await
            .unwrap();

        let first = ensure_future_task(&db, &a, today).await.unwrap().unwrap();
        let second = ensure_future_task(&db, &a, today).await.unwrap().unwrap();

        assert_eq!(first.due_date, date(2026, 5, 15));
        assert_eq!(first.id, second.id);
        assert_eq!(db.list_tasks_for_appliance(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ensure_without_interval_writes_nothing() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let today = date(2026, 5, 1);
        let a = db
            .insert_appliance("Toaster", None, noon(today))
            .await
            .unwrap();

        assert!(ensure_future_task(&db, &a, today).await.unwrap().is_none());
        assert!(db.list_tasks_for_appliance(a.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rapid_completions_never_repeat_a_due_date() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let today = date(2026, 5, 1);
        let a = db
            .insert_appliance("Humidifier", Some(7), noon(today))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut task = ensure_future_task(&db, &a, today).await.unwrap().unwrap();
        for _ in 0..3 {
            seen.push(task.due_date);
            db.set_task_completion(task.id, true, Some(noon(today)))
                .await
                .unwrap();
            task = ensure_future_task(&db, &a, today).await.unwrap().unwrap();
        }
        seen.push(task.due_date);

        assert_eq!(
            seen,
            vec![
                date(2026, 5, 8),
                date(2026, 5, 15),
                date(2026, 5, 22),
                date(2026, 5, 29)
            ]
        );
    }

    #[tokio::test]
    async fn lowered_interval_stays_after_existing_due_date() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let today = date(2026, 5, 1);
        let mut a = db
            .insert_appliance("HVAC Filter", Some(60), noon(today))
            .await
            .unwrap();
        let first = ensure_future_task(&db, &a, today).await.unwrap().unwrap();
        db.set_task_completion(first.id, true, Some(noon(today)))
            .await
            .unwrap();

        a.cleaning_interval_days = Some(5);
        let next = ensure_future_task(&db, &a, today).await.unwrap().unwrap();
        assert!(next.due_date > first.due_date);
        assert_eq!(next.due_date, date(2026, 7, 5));
    }
}
