// handlers/protected/workspace/reactivate.rs - POST /api/workspace/reactivate handler

use axum::extract::State;
use serde::Serialize;

use crate::app::AppState;
use crate::auth::Identity;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::TenantContext;

#[derive(Debug, Serialize)]
pub struct ReactivateResponse {
    pub slug: String,
    /// False when the workspace was already active.
    pub reactivated: bool,
}

/// POST /api/workspace/reactivate - Turn an inactive workspace back on.
/// The only workspace route that resolves inactive tenants.
pub async fn reactivate_post(
    State(state): State<AppState>,
    identity: Identity,
    workspace: TenantContext,
) -> ApiResult<ReactivateResponse> {
    let reactivated = state
        .tenants
        .reactivate(&workspace)
        .await
        .map_err(|e| ApiError::from(e).at("/api/workspace/reactivate"))?;

    tracing::info!(
        user_id = %identity.user_id,
        tenant_id = %workspace.tenant_id,
        reactivated,
        "Workspace reactivation requested"
    );

    Ok(ApiResponse::success(ReactivateResponse {
        slug: workspace.slug.to_string(),
        reactivated,
    }))
}
