use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub store: String,
    pub store_backend: String,
    pub notifications: String,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let store_result = state.store.health_check().await;
    if let Err(e) = &store_result {
        tracing::warn!(error = %e, "Store health check failed");
    }

    let (status, status_code) = if store_result.is_ok() {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    let notifications = if state.notifier.is_some() {
        "enabled"
    } else {
        "disabled"
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                store: if store_result.is_ok() { "ok" } else { "error" }.to_string(),
                store_backend: state.store.backend_name().to_string(),
                notifications: notifications.to_string(),
            },
        }),
    )
}
