use axum::{extract::State, http::Uri};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub api_prefix: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
}

/// GET / - service name and version
pub async fn root() -> ApiResponse<ServiceInfo> {
    ApiResponse::success(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        api_prefix: crate::app::API_PREFIX,
    })
}

/// GET /health - 503 when the store cannot be reached
pub async fn health(State(state): State<AppState>) -> ApiResult<HealthStatus> {
    if let Err(e) = state.store.health_check().await {
        error!("Health check failed: {}", e);
        return Err(ApiError::service_unavailable("Database unreachable"));
    }

    Ok(ApiResponse::with_message(
        HealthStatus { status: "ok", database: "connected" },
        "HEALTHY",
        "Service is healthy",
    ))
}

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Route {} not found", uri.path()))
}
