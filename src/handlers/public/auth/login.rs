// handlers/public/auth/login.rs - POST /auth/login handler

use axum::{extract::State, http::HeaderMap, http::header, Json};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::{AuthError, Identity, IssuedSession};
use crate::database::models::{DeviceFingerprint, User};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::security::ClientIp;
use crate::tenant::{TenantContext, TenantError, TenantSlug};

/// Input:
/// ```json
/// { "email": "ada@example.com", "password": "...", "loginType": true, "workspace": "acme" }
/// ```
/// `loginType: true` asks for a persistent session (a refresh token bound
/// to this device). `workspace` scopes the access token to a membership.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub login_type: bool,
    pub workspace: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: User,
    #[serde(flatten)]
    pub session: IssuedSession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<TenantContext>,
}

/// POST /auth/login - Check credentials and issue a session
pub async fn login_post(
    State(state): State<AppState>,
    client_ip: ClientIp,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required").at("/auth/login"));
    }

    let user = state
        .users()
        .verify_credentials(&payload.email, &payload.password)
        .await
        .map_err(|e| ApiError::from(e).at("/auth/login"))?
        .ok_or_else(|| {
            tracing::info!(client_ip = %client_ip, "Login rejected for '{}'", payload.email.trim());
            ApiError::from(AuthError::InvalidCredentials).at("/auth/login")
        })?;

    let (identity, workspace) = match payload.workspace.as_deref() {
        Some(raw) => scoped_identity(&state, &user, raw)
            .await
            .map_err(|e| e.at("/auth/login"))?,
        None => (Identity::user(user.id), None),
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let fingerprint = DeviceFingerprint::new(client_ip.to_string(), user_agent);

    let session = state
        .lifecycle()
        .issue_session(&identity, &fingerprint, payload.login_type)
        .await
        .map_err(|e| ApiError::from(e).at("/auth/login"))?;

    tracing::info!(user_id = %user.id, persistent = payload.login_type, "User logged in");

    Ok(ApiResponse::success(LoginResponse {
        user,
        session,
        workspace,
    }))
}

/// Identity carrying the user's membership in `raw_slug`.
async fn scoped_identity(
    state: &AppState,
    user: &User,
    raw_slug: &str,
) -> Result<(Identity, Option<TenantContext>), ApiError> {
    let slug = TenantSlug::parse(&raw_slug.trim().to_ascii_lowercase()).map_err(TenantError::from)?;
    let context = state
        .tenants
        .lookup(&slug)
        .await
        .map_err(TenantError::from)?
        .ok_or_else(|| TenantError::TenantNotFound(slug.to_string()))?;
    if !context.is_active {
        return Err(TenantError::TenantInactive(slug.to_string()).into());
    }

    let membership = state
        .tenants
        .directory()
        .find_membership(context.tenant_id, user.id)
        .await?
        .ok_or_else(|| {
            tracing::info!(user_id = %user.id, "Login for workspace '{}' without membership", slug);
            ApiError::unauthorized("Not a member of this workspace")
        })?;

    let identity = Identity {
        user_id: user.id,
        tenant_id: Some(context.tenant_id),
        member_id: Some(membership.member_id),
        role: Some(membership.role),
    };
    Ok((identity, Some(context)))
}
