pub mod cache;
pub mod resolver;
pub mod slug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{Membership, Tenant};
use crate::error::InternalError;

pub use cache::TenantCache;
pub use resolver::TenantResolver;
pub use slug::{sanitize, SchemaName, TenantSlug, ValidationError};

/// How strictly a route needs a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteClass {
    /// No tenant resolution at all.
    Public,
    /// Resolved when possible, never aborts the request.
    Optional,
    /// Must resolve to an active tenant (unless the route allows inactive ones).
    Required,
}

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("workspace identifier missing")]
    MissingTenant,

    #[error("workspace not found: {0}")]
    TenantNotFound(String),

    #[error("workspace inactive: {0}")]
    TenantInactive(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Subscription tier; drives rate-limit ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    /// Unknown plan names fall back to the lowest tier.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pro" => Plan::Pro,
            "enterprise" => Plan::Enterprise,
            _ => Plan::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }
}

/// Tenant attached to a request after resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub slug: TenantSlug,
    pub schema_name: SchemaName,
    pub is_active: bool,
    pub plan: Plan,
}

impl TenantContext {
    /// Build a context from a directory row. The stored slug is validated
    /// again before a schema name is derived from it.
    pub fn from_record(tenant: &Tenant) -> Result<Self, ValidationError> {
        let slug = TenantSlug::parse(&tenant.slug)?;
        Ok(Self {
            tenant_id: tenant.id,
            schema_name: SchemaName::for_slug(&slug),
            slug,
            is_active: tenant.is_active,
            plan: Plan::parse(&tenant.plan),
        })
    }
}

/// Read access to the tenant registry.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_by_slug(&self, slug: &TenantSlug) -> Result<Option<Tenant>, InternalError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, InternalError>;

    /// Membership of `user_id` in `tenant_id`, used to scope access-token claims.
    async fn find_membership(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, InternalError>;

    /// Flip a tenant's active flag. Returns whether a row changed.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, InternalError>;
}
