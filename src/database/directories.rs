//! Postgres-backed user and tenant directories.
//!
//! Both read the shared (non-tenant) schema. Password hashing stays in the
//! database: credentials are checked with pgcrypto's `crypt()`.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::manager::{bounded, DatabaseManager};
use super::models::{Membership, Tenant, User};
use crate::auth::UserDirectory;
use crate::error::InternalError;
use crate::tenant::{TenantDirectory, TenantSlug};

const USER_COLUMNS: &str = "id, email, name, is_active, created_at";
const TENANT_COLUMNS: &str = "id, slug, name, is_active, plan, created_at";

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
    io_timeout: Duration,
}

impl PgUserDirectory {
    pub fn new(db: &DatabaseManager) -> Self {
        Self {
            pool: db.pool().clone(),
            io_timeout: db.io_timeout(),
        }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<User>, InternalError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1 AND is_active", USER_COLUMNS);
        bounded(
            self.io_timeout,
            "find user",
            sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(&self.pool),
        )
        .await
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>, InternalError> {
        let sql = format!(
            "SELECT {} FROM users \
             WHERE lower(email) = lower($1) AND is_active \
               AND password_hash IS NOT NULL AND password_hash = crypt($2, password_hash)",
            USER_COLUMNS
        );
        bounded(
            self.io_timeout,
            "verify credentials",
            sqlx::query_as::<_, User>(&sql)
                .bind(email.trim())
                .bind(password)
                .fetch_optional(&self.pool),
        )
        .await
    }
}

#[derive(Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
    io_timeout: Duration,
}

impl PgTenantDirectory {
    pub fn new(db: &DatabaseManager) -> Self {
        Self {
            pool: db.pool().clone(),
            io_timeout: db.io_timeout(),
        }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn find_by_slug(&self, slug: &TenantSlug) -> Result<Option<Tenant>, InternalError> {
        let sql = format!("SELECT {} FROM tenants WHERE slug = $1", TENANT_COLUMNS);
        bounded(
            self.io_timeout,
            "find tenant by slug",
            sqlx::query_as::<_, Tenant>(&sql).bind(slug.as_str()).fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, InternalError> {
        let sql = format!("SELECT {} FROM tenants WHERE id = $1", TENANT_COLUMNS);
        bounded(
            self.io_timeout,
            "find tenant by id",
            sqlx::query_as::<_, Tenant>(&sql).bind(id).fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_membership(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, InternalError> {
        bounded(
            self.io_timeout,
            "find membership",
            sqlx::query_as::<_, Membership>(
                "SELECT id AS member_id, tenant_id, user_id, role FROM tenant_members \
                 WHERE tenant_id = $1 AND user_id = $2",
            )
            .bind(tenant_id)
            .bind(user_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, InternalError> {
        let result = bounded(
            self.io_timeout,
            "set tenant active",
            sqlx::query("UPDATE tenants SET is_active = $2 WHERE id = $1 AND is_active <> $2")
                .bind(id)
                .bind(active)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
