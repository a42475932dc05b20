// handlers/public/health.rs - GET /health handler

use axum::{extract::State, http::StatusCode};
use serde::Serialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub timestamp: String,
}

/// GET /health - Liveness plus a database ping when one is configured.
/// Answers 503 with `status: "degraded"` when the ping fails.
pub async fn health(State(state): State<AppState>) -> ApiResult<HealthReport> {
    let database = match &state.database {
        None => "not_configured",
        Some(db) => match db.health_check().await {
            Ok(()) => "ok",
            Err(e) => {
                tracing::warn!("Health check failed: {}", e);
                "unavailable"
            }
        },
    };

    let (status, code) = if database == "unavailable" {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    } else {
        ("ok", StatusCode::OK)
    };

    Ok(ApiResponse::with_status(
        HealthReport {
            status,
            database,
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
        code,
    ))
}
