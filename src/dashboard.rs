//! Read-only dashboard view: due tasks plus recent readings by room.

use std::collections::BTreeMap;

use axum::{
    Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get,
};
use serde::Serialize;
use serde_json::json;

use crate::api::{AppState, error_response};
use crate::appliances::{ApplianceService, DueTask};
use crate::error::ServiceError;
use crate::readings::{ReadingService, TemperatureReading};

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    /// Incomplete tasks due today or earlier, by due date.
    pub due_tasks: Vec<DueTask>,
    /// Most recent readings, oldest first.
    pub recent_temps: Vec<TemperatureReading>,
    /// The same readings keyed by room, each list in the same order.
    pub recent_temps_by_room: BTreeMap<String, Vec<TemperatureReading>>,
}

/// Group readings by room, keeping their relative order within each room.
pub fn group_by_room(readings: &[TemperatureReading]) -> BTreeMap<String, Vec<TemperatureReading>> {
    let mut by_room: BTreeMap<String, Vec<TemperatureReading>> = BTreeMap::new();
    for reading in readings {
        by_room
            .entry(reading.room.clone())
            .or_default()
            .push(reading.clone());
    }
    by_room
}

/// Assemble the dashboard from the current state of both services.
pub async fn build_dashboard(
    appliances: &ApplianceService,
    readings: &ReadingService,
    limit: usize,
) -> Result<Dashboard, ServiceError> {
    let due_tasks = appliances.list_due_tasks().await?;
    let recent_temps = readings.recent(limit).await?;
    let recent_temps_by_room = group_by_room(&recent_temps);

    Ok(Dashboard {
        due_tasks,
        recent_temps,
        recent_temps_by_room,
    })
}

pub fn dashboard_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/dashboard", get(get_dashboard))
        .with_state(state)
}

async fn get_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    match build_dashboard(&state.appliances, &state.readings, state.recent_readings_limit).await {
        Ok(dashboard) => (StatusCode::OK, Json(json!(dashboard))),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::clock::FixedClock;
    use crate::store::{LibSqlBackend, WriteGate};

    async fn services() -> (ApplianceService, ReadingService, Arc<FixedClock>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let clock = Arc::new(FixedClock::at_date(
            NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
        ));
        let gate = WriteGate::new();
        (
            ApplianceService::new(db.clone(), clock.clone(), gate.clone()),
            ReadingService::new(db, clock.clone(), gate),
            clock,
        )
    }

    #[tokio::test]
    async fn groups_rooms_and_clearing_one_leaves_the_other() {
        let (appliances, readings, clock) = services().await;
        for (value, room) in [(20.1, "A"), (18.7, "B"), (21.4, "A")] {
            readings.add(value, Some(room)).await.unwrap();
            clock.advance(Duration::seconds(30));
        }

        let dashboard = build_dashboard(&appliances, &readings, 200).await.unwrap();
        assert_eq!(dashboard.recent_temps.len(), 3);
        assert_eq!(dashboard.recent_temps_by_room["A"].len(), 2);
        assert_eq!(dashboard.recent_temps_by_room["B"].len(), 1);
        let a_values: Vec<f64> = dashboard.recent_temps_by_room["A"]
            .iter()
            .map(|r| r.value_c)
            .collect();
        assert_eq!(a_values, vec![20.1, 21.4]);

        readings.clear(Some("A")).await.unwrap();
        let dashboard = build_dashboard(&appliances, &readings, 200).await.unwrap();
        assert!(!dashboard.recent_temps_by_room.contains_key("A"));
        assert_eq!(dashboard.recent_temps_by_room["B"].len(), 1);
    }

    #[tokio::test]
    async fn due_tasks_appear_once_their_date_arrives() {
        let (appliances, readings, clock) = services().await;
        appliances.create_appliance("Cat Fountain", Some(7)).await.unwrap();
        appliances.create_appliance("Dishwasher", Some(30)).await.unwrap();

        let dashboard = build_dashboard(&appliances, &readings, 200).await.unwrap();
        assert!(dashboard.due_tasks.is_empty());

        clock.advance(Duration::days(10));
        let dashboard = build_dashboard(&appliances, &readings, 200).await.unwrap();
        assert_eq!(dashboard.due_tasks.len(), 1);
        assert_eq!(dashboard.due_tasks[0].appliance.name, "Cat Fountain");

        let json = serde_json::to_value(&dashboard).unwrap();
        assert!(json["recent_temps"].as_array().unwrap().is_empty());
        assert!(json["recent_temps_by_room"].as_object().unwrap().is_empty());
        assert_eq!(json["due_tasks"][0]["due_date"], "2026-04-08");
    }
}
