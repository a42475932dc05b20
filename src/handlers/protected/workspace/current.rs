// handlers/protected/workspace/current.rs - GET /api/workspace handler

use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::TenantContext;

/// GET /api/workspace - The resolved workspace
pub async fn current_get(workspace: TenantContext) -> ApiResult<TenantContext> {
    Ok(ApiResponse::success(workspace))
}
