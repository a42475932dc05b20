// handlers/protected/auth/whoami.rs - GET /api/auth/whoami handler

use axum::extract::State;
use serde::Serialize;

use crate::app::AppState;
use crate::auth::Identity;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::TenantContext;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub user: User,
    pub identity: Identity,
    pub workspace: Option<TenantContext>,
}

/// GET /api/auth/whoami - The authenticated user, the token's claims and
/// the workspace when one was resolved.
pub async fn whoami_get(
    State(state): State<AppState>,
    identity: Identity,
    workspace: Option<TenantContext>,
) -> ApiResult<WhoAmI> {
    let user = state
        .users()
        .find_active_by_id(identity.user_id)
        .await
        .map_err(|e| ApiError::from(e).at("/api/auth/whoami"))?
        .ok_or_else(|| ApiError::unauthorized("User not found or inactive").at("/api/auth/whoami"))?;

    Ok(ApiResponse::success(WhoAmI {
        user,
        identity,
        workspace,
    }))
}
