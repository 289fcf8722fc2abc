//! Write serialization and transaction bracketing for service operations.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::error::DatabaseError;
use crate::store::traits::Database;

/// Serializes units of work over the shared connection.
///
/// Every mutating operation holds the gate from `BEGIN` to `COMMIT` so that
/// no two transactions interleave on the single connection, and two
/// concurrent scheduling passes for one appliance cannot both observe "no
/// upcoming task".
#[derive(Clone, Default)]
pub struct WriteGate {
    inner: Arc<Mutex<()>>,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().await
    }
}

/// Close the transaction opened with [`Database::begin`]: commit on success,
/// roll back on failure. A commit that fails is rolled back too, so the
/// connection never stays inside the transaction. The original error wins
/// over a failed rollback.
pub async fn finish<T, E>(db: &dyn Database, outcome: Result<T, E>) -> Result<T, E>
where
    E: From<DatabaseError> + std::fmt::Display,
{
    match outcome {
        Ok(value) => {
            if let Err(commit_err) = db.commit().await {
                if let Err(rollback_err) = db.rollback().await {
                    warn!(
                        error = %rollback_err,
                        cause = %commit_err,
                        "Rollback after failed commit failed"
                    );
                }
                return Err(commit_err.into());
            }
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = db.rollback().await {
                warn!(error = %rollback_err, cause = %e, "Rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::store::LibSqlBackend;
    use chrono::Utc;

    #[tokio::test]
    async fn finish_commits_ok_and_rolls_back_err() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        db.begin().await.unwrap();
        let inserted = db.insert_appliance("Kept", None, Utc::now()).await;
        let kept = finish::<_, DatabaseError>(&db, inserted).await.unwrap();

        db.begin().await.unwrap();
        let outcome: Result<(), DatabaseError> = async {
            db.insert_appliance("Dropped", None, Utc::now()).await?;
            Err(DatabaseError::Query("boom".into()))
        }
        .await;
        assert!(finish(&db, outcome).await.is_err());

        let names: Vec<String> = db
            .list_appliances()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec![kept.name]);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_rows_and_no_open_transaction() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("home.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        db.set_busy_timeout(Duration::ZERO).await.unwrap();

        // A second connection in a read transaction blocks the commit.
        let other = libsql::Builder::new_local(&path).build().await.unwrap();
        let reader = other.connect().unwrap();
        reader.execute("BEGIN", ()).await.unwrap();
        let mut rows = reader
            .query("SELECT COUNT(*) FROM appliances", ())
            .await
            .unwrap();
        rows.next().await.unwrap();
        drop(rows);

        db.begin().await.unwrap();
        let inserted = db.insert_appliance("Washer", Some(14), Utc::now()).await;
        let err = finish::<_, DatabaseError>(&db, inserted).await.unwrap_err();
        assert!(err.to_string().contains("commit"), "{err}");

        reader.execute("COMMIT", ()).await.unwrap();
        assert!(db.list_appliances().await.unwrap().is_empty());

        db.begin().await.unwrap();
        let inserted = db.insert_appliance("Dryer", Some(7), Utc::now()).await;
        finish::<_, DatabaseError>(&db, inserted).await.unwrap();

        let names: Vec<String> = db
            .list_appliances()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Dryer".to_string()]);
    }

    #[tokio::test]
    async fn gate_is_shared_between_clones() {
        let gate = WriteGate::new();
        let other = gate.clone();

        let _held = gate.acquire().await;
        assert!(other.inner.try_lock().is_err());
    }
}
