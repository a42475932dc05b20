// handlers/public/auth/refresh.rs - POST /auth/refresh handler

use axum::{extract::State, Json};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

/// Input: `{ "accessToken": "<expired or live>", "refreshToken": "..." }`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

/// POST /auth/refresh - Exchange a refresh token for a new access token.
///
/// Same rules as the header-driven refresh. The refresh token itself is
/// not rotated, and workspace scope is not carried over.
pub async fn refresh_post(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<RefreshResponse> {
    let refreshed = state
        .lifecycle()
        .refresh_session(payload.access_token.trim(), payload.refresh_token.trim())
        .await
        .map_err(|e| ApiError::from(e).at("/auth/refresh"))?;

    Ok(ApiResponse::success(RefreshResponse {
        access_expires_at: Utc.timestamp_opt(refreshed.claims.exp, 0).single(),
        access_token: refreshed.access_token,
        user: refreshed.user,
    }))
}
