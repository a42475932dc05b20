// handlers/protected/auth/logout.rs - POST /auth/logout handler

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::{Identity, RevokeTarget, REFRESH_TOKEN_HEADER};
use crate::database::models::RevokeReason;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

/// Optional body: `{ "all": true }` ends every session of the caller;
/// otherwise the refresh token from the `refreshtoken` header or
/// `refreshToken` field is revoked.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub all: bool,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: u64,
}

/// POST /auth/logout - Revoke the caller's refresh token(s)
pub async fn logout_post(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    payload: Option<Json<LogoutRequest>>,
) -> ApiResult<LogoutResponse> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let lifecycle = state.lifecycle();

    let revoked = if payload.all {
        lifecycle
            .revoke(RevokeTarget::AllForUser(identity.user_id), RevokeReason::Logout)
            .await
    } else {
        let presented = headers
            .get(REFRESH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or(payload.refresh_token)
            .filter(|t| !t.trim().is_empty());
        match presented {
            Some(token) => {
                lifecycle
                    .revoke_presented(identity.user_id, token.trim(), RevokeReason::Logout)
                    .await
            }
            None => Ok(0),
        }
    }
    .map_err(|e| ApiError::from(e).at("/auth/logout"))?;

    Ok(ApiResponse::success(LogoutResponse { revoked }))
}
