//! Health check handlers
//!
//! Liveness endpoint for container orchestration

use crate::handlers::AppState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service name
    pub service: String,
    /// Version information
    pub version: String,
    /// Timestamp
    pub timestamp: String,
    /// Details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

/// Check result
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthDetails {
    /// Whether an Azure OpenAI endpoint is configured
    pub endpoint_configured: bool,
    /// `api_key` or `token`
    pub auth_mode: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}

/// Basic health check
///
/// GET /health
/// Does not call the upstream model.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Executing health check");

    let auth_mode = if state.settings.uses_static_key() {
        "api_key"
    } else {
        "token"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: crate::NAME.to_string(),
        version: crate::VERSION.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        details: Some(HealthDetails {
            endpoint_configured: state.settings.completion.endpoint.is_some(),
            auth_mode: auth_mode.to_string(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
        }),
    })
}
