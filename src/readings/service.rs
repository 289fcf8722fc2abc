//! Temperature reading ingestion and retrieval.

use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::readings::model::{DEFAULT_ROOM, TemperatureReading};
use crate::store::{Database, WriteGate};

#[derive(Clone)]
pub struct ReadingService {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    gate: WriteGate,
}

impl ReadingService {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>, gate: WriteGate) -> Self {
        Self { db, clock, gate }
    }

    /// Record a reading taken now. Readings without a room go to
    /// [`DEFAULT_ROOM`]; a blank room is rejected.
    pub async fn add(
        &self,
        value_c: f64,
        room: Option<&str>,
    ) -> Result<TemperatureReading, ServiceError> {
        if !value_c.is_finite() {
            return Err(ServiceError::Validation("value_c must be a finite number".into()));
        }
        let room = match room.map(str::trim) {
            None => DEFAULT_ROOM,
            Some("") => return Err(ServiceError::Validation("room must not be empty".into())),
            Some(room) => room,
        };

        let _guard = self.gate.acquire().await;
        let reading = self.db.insert_reading(value_c, room, self.clock.now()).await?;
        Ok(reading)
    }

    /// The `limit` most recent readings, oldest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<TemperatureReading>, ServiceError> {
        let _guard = self.gate.acquire().await;
        Ok(self.db.recent_readings(limit).await?)
    }

    /// Delete one room's readings, or all of them when no room is given.
    pub async fn clear(&self, room: Option<&str>) -> Result<usize, ServiceError> {
        let room = room.map(str::trim).filter(|r| !r.is_empty());

        let _guard = self.gate.acquire().await;
        let deleted = self.db.clear_readings(room).await?;
        info!(room = room.unwrap_or("*"), deleted, "Temperature readings cleared");
        Ok(deleted)
    }
}
