//! Temperature reading data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Room assigned to readings submitted without one.
pub const DEFAULT_ROOM: &str = "default";

/// A single temperature sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub value_c: f64,
    pub room: String,
}
