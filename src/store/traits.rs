//! `Database` trait: single async interface for all persistence.
//!
//! Pure data access: no scheduling rules live behind this trait. Units of work
//! are bracketed with [`Database::begin`] / [`Database::commit`] /
//! [`Database::rollback`] by the services (see `store::unit_of_work`).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::appliances::model::{Appliance, CleaningTask, DueTask};
use crate::error::DatabaseError;
use crate::readings::model::TemperatureReading;

/// Backend-agnostic database trait covering appliances, tasks, readings and metadata.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Transactions ────────────────────────────────────────────────

    /// Open a write transaction.
    async fn begin(&self) -> Result<(), DatabaseError>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<(), DatabaseError>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> Result<(), DatabaseError>;

    // ── Appliances ──────────────────────────────────────────────────

    /// Insert a new appliance and return it with its assigned id.
    async fn insert_appliance(
        &self,
        name: &str,
        cleaning_interval_days: Option<u32>,
        created_at: DateTime<Utc>,
    ) -> Result<Appliance, DatabaseError>;

    /// Get an appliance by id.
    async fn get_appliance(&self, id: i64) -> Result<Option<Appliance>, DatabaseError>;

    /// Get the first appliance (lowest id) with exactly this name.
    async fn find_appliance_by_name(&self, name: &str)
    -> Result<Option<Appliance>, DatabaseError>;

    /// All appliances, newest first.
    async fn list_appliances(&self) -> Result<Vec<Appliance>, DatabaseError>;

    /// Overwrite an appliance's cleaning interval.
    async fn set_appliance_interval(
        &self,
        id: i64,
        cleaning_interval_days: Option<u32>,
    ) -> Result<(), DatabaseError>;

    /// Delete an appliance together with all of its tasks.
    /// Returns false when no such appliance exists.
    async fn delete_appliance(&self, id: i64) -> Result<bool, DatabaseError>;

    // ── Cleaning tasks ──────────────────────────────────────────────

    /// Insert an incomplete task.
    async fn insert_task(
        &self,
        appliance_id: i64,
        due_date: NaiveDate,
    ) -> Result<CleaningTask, DatabaseError>;

    /// Get a task by id.
    async fn get_task(&self, id: i64) -> Result<Option<CleaningTask>, DatabaseError>;

    /// All tasks of an appliance, by due date ascending.
    async fn list_tasks_for_appliance(
        &self,
        appliance_id: i64,
    ) -> Result<Vec<CleaningTask>, DatabaseError>;

    /// Incomplete tasks of an appliance, by due date ascending.
    async fn list_incomplete_tasks(
        &self,
        appliance_id: i64,
    ) -> Result<Vec<CleaningTask>, DatabaseError>;

    /// The completed task with the latest `completed_at`.
    async fn latest_completed_task(
        &self,
        appliance_id: i64,
    ) -> Result<Option<CleaningTask>, DatabaseError>;

    /// The task (completed or not) with the latest `due_date`.
    async fn latest_due_task(
        &self,
        appliance_id: i64,
    ) -> Result<Option<CleaningTask>, DatabaseError>;

    /// Set the completion flag and timestamp of a task.
    async fn set_task_completion(
        &self,
        id: i64,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    /// Delete incomplete tasks of an appliance due on or after `from`.
    /// Returns the number of tasks deleted.
    async fn delete_incomplete_tasks_from(
        &self,
        appliance_id: i64,
        from: NaiveDate,
    ) -> Result<usize, DatabaseError>;

    /// Incomplete tasks due on or before `until`, joined with their appliance,
    /// by due date ascending.
    async fn list_due_tasks(&self, until: NaiveDate) -> Result<Vec<DueTask>, DatabaseError>;

    // ── Temperature readings ────────────────────────────────────────

    /// Append a reading.
    async fn insert_reading(
        &self,
        value_c: f64,
        room: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<TemperatureReading, DatabaseError>;

    /// The `limit` most recent readings, returned oldest first.
    async fn recent_readings(&self, limit: usize)
    -> Result<Vec<TemperatureReading>, DatabaseError>;

    /// Delete readings, all of them or only one room's.
    /// Returns the number of readings deleted.
    async fn clear_readings(&self, room: Option<&str>) -> Result<usize, DatabaseError>;

    // ── Metadata ────────────────────────────────────────────────────

    /// Read a metadata value.
    async fn get_meta(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    /// Write a metadata value once; an existing key keeps its value.
    async fn put_meta_once(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
}
