//! REST endpoints for appliances and their cleaning tasks.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::api::{AppState, error_response};

/// Build the router for `/api/appliances` and `/api/tasks`.
pub fn appliance_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/appliances", get(list_appliances).post(create_appliance))
        .route("/api/appliances/", get(list_appliances).post(create_appliance))
        .route("/api/appliances/bulk-delete", post(bulk_delete))
        .route("/api/appliances/{id}", get(get_appliance))
        .route("/api/appliances/{id}/interval", patch(update_interval))
        .route("/api/appliances/{id}/tasks", get(list_tasks))
        .route("/api/tasks/due", get(list_due_tasks))
        .route("/api/tasks/{id}", patch(update_task))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateApplianceRequest {
    name: String,
    cleaning_interval_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct IntervalRequest {
    cleaning_interval_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct BulkDeleteRequest {
    ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct TaskUpdateRequest {
    completed: bool,
}

// ── Appliances ──────────────────────────────────────────────────────────

async fn list_appliances(State(state): State<AppState>) -> impl IntoResponse {
    match state.appliances.list_appliances().await {
        Ok(appliances) => (StatusCode::OK, Json(json!(appliances))),
        Err(e) => error_response(e),
    }
}

async fn create_appliance(
    State(state): State<AppState>,
    Json(body): Json<CreateApplianceRequest>,
) -> impl IntoResponse {
    match state
        .appliances
        .create_appliance(&body.name, body.cleaning_interval_days)
        .await
    {
        Ok(appliance) => (StatusCode::CREATED, Json(json!(appliance))),
        Err(e) => error_response(e),
    }
}

async fn get_appliance(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.appliances.get_appliance(id).await {
        Ok(appliance) => (StatusCode::OK, Json(json!(appliance))),
        Err(e) => error_response(e),
    }
}

async fn update_interval(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<IntervalRequest>,
) -> impl IntoResponse {
    match state
        .appliances
        .update_interval(id, body.cleaning_interval_days)
        .await
    {
        Ok(appliance) => (StatusCode::OK, Json(json!(appliance))),
        Err(e) => error_response(e),
    }
}

async fn bulk_delete(
    State(state): State<AppState>,
    Json(body): Json<BulkDeleteRequest>,
) -> impl IntoResponse {
    debug!(count = body.ids.len(), "Bulk delete requested");
    match state.appliances.bulk_delete(&body.ids).await {
        Ok(deleted) => (StatusCode::OK, Json(json!({"deleted": deleted}))),
        Err(e) => error_response(e),
    }
}

async fn list_tasks(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.appliances.list_tasks(id).await {
        Ok(tasks) => (StatusCode::OK, Json(json!(tasks))),
        Err(e) => error_response(e),
    }
}

// ── Tasks ───────────────────────────────────────────────────────────────

async fn list_due_tasks(State(state): State<AppState>) -> impl IntoResponse {
    match state.appliances.list_due_tasks().await {
        Ok(tasks) => (StatusCode::OK, Json(json!(tasks))),
        Err(e) => error_response(e),
    }
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<TaskUpdateRequest>,
) -> impl IntoResponse {
    match state.appliances.complete_task(id, body.completed).await {
        Ok(task) => (StatusCode::OK, Json(json!(task))),
        Err(e) => error_response(e),
    }
}
