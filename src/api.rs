//! HTTP surface: shared state, error mapping and the top-level router.

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::appliances::{ApplianceService, ensure_seed_defaults, routes::appliance_routes};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::dashboard::dashboard_routes;
use crate::error::{Result, ServiceError};
use crate::readings::{ReadingService, routes::reading_routes};
use crate::store::{Database, LibSqlBackend, WriteGate};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub appliances: ApplianceService,
    pub readings: ReadingService,
    /// Readings returned by the dashboard and by default from the listing.
    pub recent_readings_limit: usize,
}

impl AppState {
    /// Open the configured database, wire the services to the system clock
    /// and seed the default appliances when enabled.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let gate = WriteGate::new();
        let appliances = ApplianceService::new(Arc::clone(&db), Arc::clone(&clock), gate.clone());
        let readings = ReadingService::new(db, clock, gate);

        ensure_seed_defaults(&appliances, config.auto_seed_defaults).await?;

        Ok(Self {
            appliances,
            readings,
            recent_readings_limit: config.recent_readings_limit,
        })
    }
}

/// Build the full API router with CORS for the given browser origins.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(appliance_routes(state.clone()))
        .merge(reading_routes(state.clone()))
        .merge(dashboard_routes(state))
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "home-dashboard"
    }))
}

/// Map a service failure to a status code and a JSON `{"error": ...}` body.
pub fn error_response(err: ServiceError) -> (StatusCode, Json<Value>) {
    match err {
        ServiceError::NotFound { .. } => {
            warn!(error = %err, "Request for missing entity");
            (StatusCode::NOT_FOUND, Json(json!({"error": err.to_string()})))
        }
        ServiceError::Validation(_) => {
            warn!(error = %err, "Rejected request");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": err.to_string()})),
            )
        }
        ServiceError::Database(e) => {
            error!(error = %e, "Database failure while handling request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error"})),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use chrono::NaiveDate;
    use tower::ServiceExt;

    use super::*;
    use crate::clock::FixedClock;
    use crate::error::{DatabaseError, Error};

    async fn test_router() -> Router {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let clock = Arc::new(FixedClock::at_date(
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        ));
        let gate = WriteGate::new();
        let state = AppState {
            appliances: ApplianceService::new(db.clone(), clock.clone(), gate.clone()),
            readings: ReadingService::new(db, clock, gate),
            recent_readings_limit: 200,
        };
        build_router(state, &["http://localhost:5173".to_string()])
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn service_errors_map_to_statuses() {
        let (status, body) = error_response(ServiceError::appliance_not_found(3));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.0["error"], "Appliance 3 not found");

        let (status, _) = error_response(ServiceError::Validation("ids must not be empty".into()));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = error_response(DatabaseError::Query("disk full".into()).into());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0["error"], "Internal server error");
    }

    #[tokio::test]
    async fn open_seeds_once_per_database_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            db_path: tmp.path().join("home.db"),
            ..AppConfig::default()
        };

        let state = AppState::open(&config).await.unwrap();
        let seeded = state.appliances.list_appliances().await.unwrap();
        assert_eq!(seeded.len(), 7);
        drop(state);

        let state = AppState::open(&config).await.unwrap();
        assert_eq!(state.appliances.list_appliances().await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn open_reports_unusable_database_path() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let config = AppConfig {
            db_path: blocker.join("home.db"),
            ..AppConfig::default()
        };

        let err = AppState::open(&config).await.err().unwrap();
        assert!(matches!(err, Error::Database(DatabaseError::Open(_))), "{err}");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = test_router().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn create_then_fetch_appliance() {
        let app = test_router().await;
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/appliances")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Washer","cleaning_interval_days":14}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/appliances/{id}/tasks"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tasks = body_json(response).await;
        assert_eq!(tasks[0]["due_date"], "2026-06-15");

        let response = app
            .oneshot(Request::get("/api/appliances/999").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn collections_accept_trailing_slash() {
        let app = test_router().await;
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/appliances/")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Dryer","cleaning_interval_days":7}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        for uri in ["/api/appliances", "/api/appliances/"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert_eq!(body_json(response).await[0]["name"], "Dryer");
        }

        for uri in ["/api/temperature", "/api/temperature/"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn zero_interval_is_unprocessable() {
        let app = test_router().await;
        let response = app
            .oneshot(
                Request::post("/api/appliances")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Washer","cleaning_interval_days":0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = test_router().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/dashboard")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:5173"
        );
    }
}
