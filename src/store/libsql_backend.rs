//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases over a single shared
//! connection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tracing::{debug, info};

use crate::appliances::model::{Appliance, CleaningTask, DueTask};
use crate::error::DatabaseError;
use crate::readings::model::{DEFAULT_ROOM, TemperatureReading};
use crate::store::migrations;
use crate::store::traits::Database;

/// Lock wait applied to every connection the backend opens.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use;
/// write transactions are serialized by the services' `WriteGate`.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if path.as_os_str() == ":memory:" {
            return Self::new_memory().await;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Open(format!("create directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Open(format!("{}: {e}", path.display())))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Open(format!("in-memory: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Open(format!("connect: {e}")))?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Open(format!("foreign keys: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.set_busy_timeout(BUSY_TIMEOUT).await?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// How long a statement waits on another connection's lock before
    /// failing with "database is locked".
    pub async fn set_busy_timeout(&self, timeout: Duration) -> Result<(), DatabaseError> {
        let sql = format!("PRAGMA busy_timeout = {}", timeout.as_millis());
        self.conn
            .execute_batch(&sql)
            .await
            .map_err(|e| DatabaseError::Open(format!("busy timeout: {e}")))?;
        Ok(())
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Timestamps are stored as fixed-width RFC 3339 so they sort as text.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Invalid timestamp {s:?}: {e}")))
}

fn interval_value(days: Option<u32>) -> Value {
    match days {
        Some(d) => Value::Integer(i64::from(d)),
        None => Value::Null,
    }
}

fn datetime_value(dt: Option<&DateTime<Utc>>) -> Value {
    match dt {
        Some(dt) => Value::Text(format_datetime(dt)),
        None => Value::Null,
    }
}

fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::Query(format!("Invalid date {s:?}: {e}")))
}

/// Map columns `offset..offset + 4` (see APPLIANCE_COLUMNS) to an Appliance.
fn row_to_appliance(row: &libsql::Row, offset: i32) -> Result<Appliance, DatabaseError> {
    let id: i64 = row
        .get(offset)
        .map_err(|e| DatabaseError::Query(format!("appliance.id: {e}")))?;
    let name: String = row
        .get(offset + 1)
        .map_err(|e| DatabaseError::Query(format!("appliance.name: {e}")))?;
    let interval: Option<i64> = row.get::<i64>(offset + 2).ok();
    let created_str: String = row
        .get(offset + 3)
        .map_err(|e| DatabaseError::Query(format!("appliance.created_at: {e}")))?;

    Ok(Appliance {
        id,
        name,
        cleaning_interval_days: interval.and_then(|d| u32::try_from(d).ok()),
        created_at: parse_datetime(&created_str)?,
    })
}

/// Map a row selected with TASK_COLUMNS to a CleaningTask.
fn row_to_task(row: &libsql::Row) -> Result<CleaningTask, DatabaseError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("task.id: {e}")))?;
    let appliance_id: i64 = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("task.appliance_id: {e}")))?;
    let due_str: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("task.due_date: {e}")))?;
    let completed_at_str: Option<String> = row.get::<String>(4).ok();

    Ok(CleaningTask {
        id,
        appliance_id,
        due_date: parse_date(&due_str)?,
        completed: row.get::<i64>(3).unwrap_or(0) != 0,
        completed_at: completed_at_str
            .filter(|s| !s.is_empty())
            .as_deref()
            .map(parse_datetime)
            .transpose()?,
    })
}

/// Map a row selected with DUE_TASK_COLUMNS to a DueTask.
fn row_to_due_task(row: &libsql::Row) -> Result<DueTask, DatabaseError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("task.id: {e}")))?;
    let due_str: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("task.due_date: {e}")))?;
    let completed_at_str: Option<String> = row.get::<String>(3).ok();

    Ok(DueTask {
        id,
        due_date: parse_date(&due_str)?,
        completed: row.get::<i64>(2).unwrap_or(0) != 0,
        completed_at: completed_at_str
            .filter(|s| !s.is_empty())
            .as_deref()
            .map(parse_datetime)
            .transpose()?,
        appliance: row_to_appliance(row, 4)?,
    })
}

fn row_to_reading(row: &libsql::Row) -> Result<TemperatureReading, DatabaseError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("reading.id: {e}")))?;
    let recorded_str: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("reading.recorded_at: {e}")))?;
    let value_c: f64 = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("reading.value_c: {e}")))?;
    let room: String = row
        .get::<String>(3)
        .unwrap_or_else(|_| DEFAULT_ROOM.to_string());

    Ok(TemperatureReading {
        id,
        recorded_at: parse_datetime(&recorded_str)?,
        value_c,
        room,
    })
}

async fn collect_tasks(mut rows: libsql::Rows) -> Result<Vec<CleaningTask>, DatabaseError> {
    let mut tasks = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("task row: {e}")))?
    {
        tasks.push(row_to_task(&row)?);
    }
    Ok(tasks)
}

async fn first_task(mut rows: libsql::Rows) -> Result<Option<CleaningTask>, DatabaseError> {
    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_task(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(DatabaseError::Query(format!("task row: {e}"))),
    }
}

// ── Trait implementation ────────────────────────────────────────────

const APPLIANCE_COLUMNS: &str = "id, name, cleaning_interval_days, created_at";

const TASK_COLUMNS: &str = "id, appliance_id, due_date, completed, completed_at";

const DUE_TASK_COLUMNS: &str = "t.id, t.due_date, t.completed, t.completed_at, a.id, a.name, a.cleaning_interval_days, a.created_at";

const READING_COLUMNS: &str = "id, recorded_at, value_c, room";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Transactions ────────────────────────────────────────────────

    async fn begin(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("begin: {e}")))?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute("COMMIT", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("commit: {e}")))?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute("ROLLBACK", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("rollback: {e}")))?;
        Ok(())
    }

    // ── Appliances ──────────────────────────────────────────────────

    async fn insert_appliance(
        &self,
        name: &str,
        cleaning_interval_days: Option<u32>,
        created_at: DateTime<Utc>,
    ) -> Result<Appliance, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO appliances (name, cleaning_interval_days, created_at) VALUES (?1, ?2, ?3)",
            params![
                name,
                interval_value(cleaning_interval_days),
                format_datetime(&created_at)
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_appliance: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(id, name, "Appliance inserted");
        Ok(Appliance {
            id,
            name: name.to_string(),
            cleaning_interval_days,
            created_at,
        })
    }

    async fn get_appliance(&self, id: i64) -> Result<Option<Appliance>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {APPLIANCE_COLUMNS} FROM appliances WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_appliance: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_appliance(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_appliance row: {e}"))),
        }
    }

    async fn find_appliance_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Appliance>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {APPLIANCE_COLUMNS} FROM appliances WHERE name = ?1 ORDER BY id ASC LIMIT 1"
                ),
                params![name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_appliance_by_name: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_appliance(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_appliance_by_name row: {e}"))),
        }
    }

    async fn list_appliances(&self) -> Result<Vec<Appliance>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {APPLIANCE_COLUMNS} FROM appliances ORDER BY created_at DESC, id DESC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_appliances: {e}")))?;

        let mut appliances = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_appliances row: {e}")))?
        {
            appliances.push(row_to_appliance(&row, 0)?);
        }
        Ok(appliances)
    }

    async fn set_appliance_interval(
        &self,
        id: i64,
        cleaning_interval_days: Option<u32>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE appliances SET cleaning_interval_days = ?1 WHERE id = ?2",
                params![interval_value(cleaning_interval_days), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_appliance_interval: {e}")))?;
        Ok(())
    }

    async fn delete_appliance(&self, id: i64) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        // Tasks go first so the cascade does not depend on the foreign_keys pragma.
        conn.execute(
            "DELETE FROM cleaning_tasks WHERE appliance_id = ?1",
            params![id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("delete_appliance tasks: {e}")))?;

        let count = conn
            .execute("DELETE FROM appliances WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_appliance: {e}")))?;
        Ok(count > 0)
    }

    // ── Cleaning tasks ──────────────────────────────────────────────

    async fn insert_task(
        &self,
        appliance_id: i64,
        due_date: NaiveDate,
    ) -> Result<CleaningTask, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO cleaning_tasks (appliance_id, due_date, completed, completed_at) VALUES (?1, ?2, 0, NULL)",
            params![appliance_id, format_date(&due_date)],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_task: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(id, appliance_id, due_date = %due_date, "Task inserted");
        Ok(CleaningTask {
            id,
            appliance_id,
            due_date,
            completed: false,
            completed_at: None,
        })
    }

    async fn get_task(&self, id: i64) -> Result<Option<CleaningTask>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM cleaning_tasks WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?;
        first_task(rows).await
    }

    async fn list_tasks_for_appliance(
        &self,
        appliance_id: i64,
    ) -> Result<Vec<CleaningTask>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM cleaning_tasks WHERE appliance_id = ?1 ORDER BY due_date ASC, id ASC"
                ),
                params![appliance_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks_for_appliance: {e}")))?;
        collect_tasks(rows).await
    }

    async fn list_incomplete_tasks(
        &self,
        appliance_id: i64,
    ) -> Result<Vec<CleaningTask>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM cleaning_tasks WHERE appliance_id = ?1 AND completed = 0 ORDER BY due_date ASC, id ASC"
                ),
                params![appliance_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_incomplete_tasks: {e}")))?;
        collect_tasks(rows).await
    }

    async fn latest_completed_task(
        &self,
        appliance_id: i64,
    ) -> Result<Option<CleaningTask>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM cleaning_tasks \
                     WHERE appliance_id = ?1 AND completed = 1 AND completed_at IS NOT NULL \
                     ORDER BY completed_at DESC, id DESC LIMIT 1"
                ),
                params![appliance_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_completed_task: {e}")))?;
        first_task(rows).await
    }

    async fn latest_due_task(
        &self,
        appliance_id: i64,
    ) -> Result<Option<CleaningTask>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM cleaning_tasks WHERE appliance_id = ?1 ORDER BY due_date DESC, id DESC LIMIT 1"
                ),
                params![appliance_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_due_task: {e}")))?;
        first_task(rows).await
    }

    async fn set_task_completion(
        &self,
        id: i64,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE cleaning_tasks SET completed = ?1, completed_at = ?2 WHERE id = ?3",
                params![
                    completed as i64,
                    datetime_value(completed_at.as_ref()),
                    id
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_task_completion: {e}")))?;
        Ok(())
    }

    async fn delete_incomplete_tasks_from(
        &self,
        appliance_id: i64,
        from: NaiveDate,
    ) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM cleaning_tasks WHERE appliance_id = ?1 AND completed = 0 AND due_date >= ?2",
                params![appliance_id, format_date(&from)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_incomplete_tasks_from: {e}")))?;
        Ok(count as usize)
    }

    async fn list_due_tasks(&self, until: NaiveDate) -> Result<Vec<DueTask>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DUE_TASK_COLUMNS} FROM cleaning_tasks t \
                     JOIN appliances a ON a.id = t.appliance_id \
                     WHERE t.completed = 0 AND t.due_date <= ?1 \
                     ORDER BY t.due_date ASC, t.id ASC"
                ),
                params![format_date(&until)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_due_tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_due_tasks row: {e}")))?
        {
            tasks.push(row_to_due_task(&row)?);
        }
        Ok(tasks)
    }

    // ── Temperature readings ────────────────────────────────────────

    async fn insert_reading(
        &self,
        value_c: f64,
        room: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<TemperatureReading, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO temperature_readings (recorded_at, value_c, room) VALUES (?1, ?2, ?3)",
            params![format_datetime(&recorded_at), value_c, room],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_reading: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(id, room, value_c, "Reading inserted");
        Ok(TemperatureReading {
            id,
            recorded_at,
            value_c,
            room: room.to_string(),
        })
    }

    async fn recent_readings(
        &self,
        limit: usize,
    ) -> Result<Vec<TemperatureReading>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {READING_COLUMNS} FROM temperature_readings ORDER BY recorded_at DESC, id DESC LIMIT ?1"
                ),
                params![limit],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_readings: {e}")))?;

        let mut readings = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_readings row: {e}")))?
        {
            readings.push(row_to_reading(&row)?);
        }
        readings.reverse();
        Ok(readings)
    }

    async fn clear_readings(&self, room: Option<&str>) -> Result<usize, DatabaseError> {
        let conn = self.conn();
        let count = match room {
            Some(room) => conn
                .execute(
                    "DELETE FROM temperature_readings WHERE room = ?1",
                    params![room],
                )
                .await,
            None => conn.execute("DELETE FROM temperature_readings", ()).await,
        }
        .map_err(|e| DatabaseError::Query(format!("clear_readings: {e}")))?;
        Ok(count as usize)
    }

    // ── Metadata ────────────────────────────────────────────────────

    async fn get_meta(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM app_meta WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_meta: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row.get(0).unwrap_or_default();
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_meta row: {e}"))),
        }
    }

    async fn put_meta_once(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO app_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_meta_once: {e}")))?;
        Ok(())
    }
}
