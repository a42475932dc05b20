use std::future::Future;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::InternalError;
use crate::tenant::TenantContext;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<DatabaseError> for InternalError {
    fn from(err: DatabaseError) -> Self {
        InternalError::StoreUnavailable(err.to_string())
    }
}

/// Tables owned by the pipeline itself. Users, tenants and memberships
/// belong to the application and are only read.
const SECURITY_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS refresh_tokens (
        id UUID PRIMARY KEY,
        token_hash TEXT NOT NULL UNIQUE,
        user_id UUID NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        last_used_at TIMESTAMPTZ,
        is_revoked BOOLEAN NOT NULL DEFAULT FALSE,
        revoked_at TIMESTAMPTZ,
        revoked_reason TEXT,
        user_agent TEXT NOT NULL DEFAULT '',
        ip_address TEXT NOT NULL DEFAULT '',
        version INTEGER NOT NULL DEFAULT 1,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_token_hash ON refresh_tokens (token_hash)",
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user_id ON refresh_tokens (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_is_revoked ON refresh_tokens (is_revoked)",
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires_at ON refresh_tokens (expires_at)",
    // At most one live token per user and device
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_refresh_tokens_live_device
        ON refresh_tokens (user_id, ip_address, user_agent) WHERE NOT is_revoked",
    "CREATE TABLE IF NOT EXISTS rate_limit_counters (
        key TEXT PRIMARY KEY,
        count INTEGER NOT NULL,
        window_reset_at TIMESTAMPTZ NOT NULL,
        blocked_until TIMESTAMPTZ,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_rate_limit_counters_window ON rate_limit_counters (window_reset_at)",
];

/// Connection pool for the shared database plus tenant-scoped transactions.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
    io_timeout: Duration,
}

impl DatabaseManager {
    /// Connect using `DATABASE_URL`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = Self::connection_string()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(&url)
            .await?;
        info!("Created database pool ({} max connections)", config.max_connections);
        Ok(Self::from_pool(pool, Duration::from_millis(config.io_timeout_ms)))
    }

    pub fn from_pool(pool: PgPool, io_timeout: Duration) -> Self {
        Self { pool, io_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    fn connection_string() -> Result<String, DatabaseError> {
        let base = std::env::var("DATABASE_URL").map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let url = url::Url::parse(&base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }
        Ok(url.into())
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), InternalError> {
        bounded(self.io_timeout, "health check", sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }

    /// Create the refresh-token and rate-limit tables if missing.
    pub async fn ensure_security_tables(&self) -> Result<(), DatabaseError> {
        for statement in SECURITY_TABLES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Security tables ready");
        Ok(())
    }

    /// Open a transaction whose `search_path` is the tenant's schema.
    ///
    /// The schema identifier comes only from the validated slug carried by
    /// `TenantContext`, quoted again here.
    pub async fn tenant_scope(&self, tenant: &TenantContext) -> Result<Transaction<'static, Postgres>, InternalError> {
        let statement = format!("SET LOCAL search_path TO {}, public", tenant.schema_name.quoted());
        bounded(self.io_timeout, "tenant scope", async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(&statement).execute(&mut *tx).await?;
            Ok::<_, sqlx::Error>(tx)
        })
        .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}

/// Run a database future under `limit`, mapping failures to
/// [`InternalError`].
pub async fn bounded<T, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, InternalError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(InternalError::StoreUnavailable(format!("{}: {}", what, e))),
        Err(_) => Err(InternalError::TimedOut(what.to_string())),
    }
}
