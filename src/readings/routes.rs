//! REST endpoints for temperature readings.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::{AppState, error_response};

/// Build the router for `/api/temperature`.
pub fn reading_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/temperature",
            get(list_readings).post(add_reading).delete(clear_readings),
        )
        .route(
            "/api/temperature/",
            get(list_readings).post(add_reading).delete(clear_readings),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AddReadingRequest {
    value_c: f64,
    room: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ClearQuery {
    room: Option<String>,
}

async fn add_reading(
    State(state): State<AppState>,
    Json(body): Json<AddReadingRequest>,
) -> impl IntoResponse {
    match state.readings.add(body.value_c, body.room.as_deref()).await {
        Ok(reading) => (StatusCode::CREATED, Json(json!(reading))),
        Err(e) => error_response(e),
    }
}

async fn list_readings(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(state.recent_readings_limit);
    match state.readings.recent(limit).await {
        Ok(readings) => (StatusCode::OK, Json(json!(readings))),
        Err(e) => error_response(e),
    }
}

async fn clear_readings(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> impl IntoResponse {
    match state.readings.clear(query.room.as_deref()).await {
        Ok(deleted) => (StatusCode::OK, Json(json!({"deleted": deleted}))),
        Err(e) => error_response(e),
    }
}
