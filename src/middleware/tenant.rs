use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::routes::RouteSpec;
use crate::app::AppState;
use crate::error::ApiError;

/// Resolves the workspace per the route's tenant class and attaches the
/// [`TenantContext`](crate::tenant::TenantContext).
pub async fn resolve_tenant(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let spec = request.extensions().get::<RouteSpec>().copied().unwrap_or_default();

    let resolved = state
        .tenants
        .resolve(request.headers(), spec.tenant, spec.allow_inactive_tenant)
        .await;

    match resolved {
        Ok(Some(context)) => {
            tracing::debug!(tenant_id = %context.tenant_id, "Resolved workspace '{}'", context.slug);
            request.extensions_mut().insert(context);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::info!("Tenant resolution failed on {}: {}", request.uri().path(), e);
            return ApiError::from(e).at(request.uri().path()).into_response();
        }
    }

    next.run(request).await
}
