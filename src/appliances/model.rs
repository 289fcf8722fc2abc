//! Appliance and cleaning-task data model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Longest cleaning interval accepted, in days.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// A household appliance with an optional cleaning cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appliance {
    /// Store-assigned identity.
    pub id: i64,
    /// Display name; soft-unique across appliances.
    pub name: String,
    /// Days between cleanings. `None` means the appliance is not scheduled.
    pub cleaning_interval_days: Option<u32>,
    /// When the appliance was first created.
    pub created_at: DateTime<Utc>,
}

impl Appliance {
    /// The cleaning interval, if the appliance is scheduled at all.
    pub fn interval(&self) -> Option<u32> {
        self.cleaning_interval_days.filter(|days| *days > 0)
    }
}

/// One occurrence of an appliance's cleaning chore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningTask {
    pub id: i64,
    pub appliance_id: i64,
    pub due_date: NaiveDate,
    pub completed: bool,
    /// Set when the task is marked complete, cleared when reverted.
    pub completed_at: Option<DateTime<Utc>>,
}

impl CleaningTask {
    /// Incomplete and due today or later.
    pub fn is_upcoming(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date >= today
    }
}

/// A due (or overdue) task joined with its owning appliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueTask {
    pub id: i64,
    pub due_date: NaiveDate,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub appliance: Appliance,
}

/// Check a requested interval before anything touches the store.
pub fn validate_interval(days: Option<u32>) -> Result<(), String> {
    match days {
        Some(0) => Err("cleaning_interval_days must be at least 1".into()),
        Some(d) if d > MAX_INTERVAL_DAYS => Err(format!(
            "cleaning_interval_days must be at most {MAX_INTERVAL_DAYS}"
        )),
        _ => Ok(()),
    }
}
