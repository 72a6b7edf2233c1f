/**
 * Health Routes
 * Endpoints for checking backend health status
 */
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::store::Store;

// Track server start time for uptime calculation
lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Initialize the server start time
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Simple health response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

/// Storage check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCheck {
    pub backend: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detailed health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub storage: StorageCheck,
}

/// GET /health - Simple health ping
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/detailed - uptime plus a storage reachability probe.
/// Overall status stays "ok" while storage is down so monitors can tell
/// "backend up, store down" apart from "backend down".
pub async fn health_detailed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = SERVER_START.elapsed().as_secs();

    let probe_start = Instant::now();
    let storage = match state.store.ping().await {
        Ok(()) => StorageCheck {
            backend: state.store.backend_name().to_string(),
            status: "healthy".to_string(),
            response_time_ms: Some(probe_start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => StorageCheck {
            backend: state.store.backend_name().to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: None,
            error: Some(e.to_string()),
        },
    };

    (
        StatusCode::OK,
        Json(DetailedHealthResponse {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            uptime,
            storage,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file::FileStore;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let dir = std::env::temp_dir().join("newsdesk-health-test");
        let state = AppState::with_store(Arc::new(FileStore::new(dir)));
        Router::new()
            .route("/health", get(health_ping))
            .route("/health/detailed", get(health_detailed))
            .with_state(state)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(app: Router, uri: &str) -> (StatusCode, T) {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value: T = serde_json::from_slice(&body).unwrap();
        (status, value)
    }

    #[tokio::test]
    async fn test_health_ping_returns_ok() {
        init_start_time();
        let (status, body) = get_json::<SimpleHealthResponse>(test_router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_health_detailed_reports_backend() {
        init_start_time();
        let (status, body) =
            get_json::<DetailedHealthResponse>(test_router(), "/health/detailed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.storage.backend, "file");
        assert_eq!(body.storage.status, "healthy");
    }
}
