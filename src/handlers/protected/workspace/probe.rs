// handlers/protected/workspace/probe.rs - GET /api/workspace/probe handler

use axum::extract::State;
use serde::Serialize;

use crate::app::AppState;
use crate::database::bounded;
use crate::error::{ApiError, InternalError};
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::TenantContext;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    pub schema_name: String,
    pub current_schema: Option<String>,
}

/// GET /api/workspace/probe - Open a tenant-scoped transaction and report
/// the schema Postgres resolved for it.
pub async fn probe_get(State(state): State<AppState>, workspace: TenantContext) -> ApiResult<ProbeResponse> {
    let path = "/api/workspace/probe";
    let db = state
        .database
        .as_ref()
        .ok_or_else(|| ApiError::from(InternalError::StoreUnavailable("no database configured".into())).at(path))?;

    let mut tx = db.tenant_scope(&workspace).await.map_err(|e| ApiError::from(e).at(path))?;
    let current_schema: Option<String> = bounded(
        db.io_timeout(),
        "probe current schema",
        sqlx::query_scalar::<_, Option<String>>("SELECT current_schema()::text").fetch_one(&mut *tx),
    )
    .await
    .map_err(|e| ApiError::from(e).at(path))?;

    // Read-only; dropping the transaction rolls it back.
    drop(tx);

    Ok(ApiResponse::success(ProbeResponse {
        schema_name: workspace.schema_name.to_string(),
        current_schema,
    }))
}
