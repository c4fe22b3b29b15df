//! Unauthenticated liveness endpoints.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Greeting returned from the root path.
#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

/// GET / - Greeting.
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Hello World",
    })
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health - Health check.
///
/// This endpoint is intentionally unauthenticated to support load balancer
/// and orchestrator probes. Returns only non-sensitive information.
///
/// Only the read-only [`nimbus_storage::ObjectStore::ping`] runs here; the write check is
/// reserved for startup.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.storage.ping().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
