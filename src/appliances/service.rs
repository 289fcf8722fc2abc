//! Appliance lifecycle and task completion.
//!
//! Every mutating operation is one unit of work: it takes the write gate,
//! opens a transaction, and commits only if every step succeeded.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::appliances::model::{Appliance, CleaningTask, DueTask, validate_interval};
use crate::appliances::scheduler::{days_after, ensure_future_task};
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::store::{Database, WriteGate, finish};

/// Orchestrates appliances, their tasks and the scheduler.
#[derive(Clone)]
pub struct ApplianceService {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    gate: WriteGate,
}

impl ApplianceService {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>, gate: WriteGate) -> Self {
        Self { db, clock, gate }
    }

    pub(crate) fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub(crate) fn gate(&self) -> &WriteGate {
        &self.gate
    }

    // ── Appliances ──────────────────────────────────────────────────

    /// Create an appliance, or return the existing one with the same name.
    ///
    /// An existing appliance only has its interval overwritten when a
    /// different, non-empty interval is supplied; that path does not touch
    /// its tasks. A new appliance is scheduled right away.
    pub async fn create_appliance(
        &self,
        name: &str,
        cleaning_interval_days: Option<u32>,
    ) -> Result<Appliance, ServiceError> {
        let name = normalize_name(name)?;
        validate_interval(cleaning_interval_days).map_err(ServiceError::Validation)?;

        let _guard = self.gate.acquire().await;
        self.db.begin().await?;
        let outcome = self.create_in_unit(&name, cleaning_interval_days).await;
        finish(self.db(), outcome).await
    }

    /// Body of [`Self::create_appliance`]; the caller owns the transaction.
    pub(crate) async fn create_in_unit(
        &self,
        name: &str,
        cleaning_interval_days: Option<u32>,
    ) -> Result<Appliance, ServiceError> {
        if let Some(mut existing) = self.db.find_appliance_by_name(name).await? {
            if let Some(days) = cleaning_interval_days
                && existing.cleaning_interval_days != Some(days)
            {
                self.db.set_appliance_interval(existing.id, Some(days)).await?;
                info!(
                    appliance_id = existing.id,
                    old = ?existing.cleaning_interval_days,
                    new = days,
                    "Existing appliance interval updated"
                );
                existing.cleaning_interval_days = Some(days);
            }
            return Ok(existing);
        }

        let appliance = self
            .db
            .insert_appliance(name, cleaning_interval_days, self.clock.now())
            .await?;
        info!(
            appliance_id = appliance.id,
            name = %appliance.name,
            interval = ?appliance.cleaning_interval_days,
            "Appliance created"
        );

        ensure_future_task(self.db(), &appliance, self.clock.today()).await?;
        Ok(appliance)
    }

    /// All appliances, newest first.
    pub async fn list_appliances(&self) -> Result<Vec<Appliance>, ServiceError> {
        let _guard = self.gate.acquire().await;
        Ok(self.db.list_appliances().await?)
    }

    pub async fn get_appliance(&self, id: i64) -> Result<Appliance, ServiceError> {
        let _guard = self.gate.acquire().await;
        self.db
            .get_appliance(id)
            .await?
            .ok_or_else(|| ServiceError::appliance_not_found(id))
    }

    /// Change (or clear) an appliance's interval and re-anchor its schedule
    /// on today.
    ///
    /// Upcoming incomplete tasks are dropped whatever the old interval was;
    /// overdue ones stay visible. With a new interval, one task is scheduled
    /// `interval` days from today.
    pub async fn update_interval(
        &self,
        id: i64,
        cleaning_interval_days: Option<u32>,
    ) -> Result<Appliance, ServiceError> {
        validate_interval(cleaning_interval_days).map_err(ServiceError::Validation)?;

        let _guard = self.gate.acquire().await;
        self.db.begin().await?;
        let outcome = self.update_interval_in_unit(id, cleaning_interval_days).await;
        finish(self.db(), outcome).await
    }

    async fn update_interval_in_unit(
        &self,
        id: i64,
        cleaning_interval_days: Option<u32>,
    ) -> Result<Appliance, ServiceError> {
        let mut appliance = self
            .db
            .get_appliance(id)
            .await?
            .ok_or_else(|| ServiceError::appliance_not_found(id))?;

        let today = self.clock.today();
        self.db
            .set_appliance_interval(id, cleaning_interval_days)
            .await?;
        let dropped = self.db.delete_incomplete_tasks_from(id, today).await?;
        appliance.cleaning_interval_days = cleaning_interval_days;

        let next_due = match appliance.interval() {
            Some(days) => {
                let due_date = days_after(today, days)?;
                self.db.insert_task(id, due_date).await?;
                Some(due_date)
            }
            None => None,
        };

        info!(
            appliance_id = id,
            interval = ?cleaning_interval_days,
            dropped,
            next_due = ?next_due,
            "Appliance interval changed"
        );
        Ok(appliance)
    }

    /// Delete the given appliances and their tasks. Unknown and repeated ids
    /// are skipped; returns how many appliances were removed.
    pub async fn bulk_delete(&self, ids: &[i64]) -> Result<usize, ServiceError> {
        if ids.is_empty() {
            return Err(ServiceError::Validation("ids must not be empty".into()));
        }
        let unique: BTreeSet<i64> = ids.iter().copied().collect();

        let _guard = self.gate.acquire().await;
        self.db.begin().await?;
        let outcome = async {
            let mut deleted = 0;
            for id in &unique {
                if self.db.delete_appliance(*id).await? {
                    deleted += 1;
                }
            }
            Ok::<_, ServiceError>(deleted)
        }
        .await;
        let deleted = finish(self.db(), outcome).await?;

        if deleted < unique.len() {
            warn!(requested = unique.len(), deleted, "Some appliance ids did not exist");
        }
        info!(deleted, "Appliances deleted");
        Ok(deleted)
    }

    // ── Tasks ───────────────────────────────────────────────────────

    /// All tasks of an appliance, by due date.
    pub async fn list_tasks(&self, appliance_id: i64) -> Result<Vec<CleaningTask>, ServiceError> {
        let _guard = self.gate.acquire().await;
        if self.db.get_appliance(appliance_id).await?.is_none() {
            return Err(ServiceError::appliance_not_found(appliance_id));
        }
        Ok(self.db.list_tasks_for_appliance(appliance_id).await?)
    }

    /// Incomplete tasks due today or earlier, with their appliances.
    pub async fn list_due_tasks(&self) -> Result<Vec<DueTask>, ServiceError> {
        let _guard = self.gate.acquire().await;
        Ok(self.db.list_due_tasks(self.clock.today()).await?)
    }

    /// Mark a task complete (scheduling the next one) or revert it.
    ///
    /// Reverting does not remove a follow-up task that was already
    /// scheduled.
    pub async fn complete_task(
        &self,
        task_id: i64,
        completed: bool,
    ) -> Result<CleaningTask, ServiceError> {
        let _guard = self.gate.acquire().await;
        self.db.begin().await?;
        let outcome = self.complete_task_in_unit(task_id, completed).await;
        finish(self.db(), outcome).await
    }

    async fn complete_task_in_unit(
        &self,
        task_id: i64,
        completed: bool,
    ) -> Result<CleaningTask, ServiceError> {
        let mut task = self
            .db
            .get_task(task_id)
            .await?
            .ok_or_else(|| ServiceError::task_not_found(task_id))?;

        if !completed {
            if task.completed {
                self.db.set_task_completion(task.id, false, None).await?;
                info!(task_id, appliance_id = task.appliance_id, "Task completion reverted");
            }
            task.completed = false;
            task.completed_at = None;
            return Ok(task);
        }

        // Completing twice keeps the first timestamp.
        let stamp = match task.completed_at.filter(|_| task.completed) {
            Some(at) => at,
            None => self.clock.now(),
        };
        self.db.set_task_completion(task.id, true, Some(stamp)).await?;
        task.completed = true;
        task.completed_at = Some(stamp);
        info!(
            task_id,
            appliance_id = task.appliance_id,
            due_date = %task.due_date,
            "Task completed"
        );

        let appliance = self
            .db
            .get_appliance(task.appliance_id)
            .await?
            .ok_or_else(|| ServiceError::appliance_not_found(task.appliance_id))?;
        ensure_future_task(self.db(), &appliance, self.clock.today()).await?;

        Ok(task)
    }
}

/// Trimmed, non-empty appliance name.
fn normalize_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::Validation("name must not be empty".into()));
    }
    Ok(name.to_string())
}
