use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::manager::{bounded, DatabaseManager};
use super::models::{NewRefreshToken, RefreshTokenRecord, RevokeReason};
use crate::auth::RefreshTokenStore;
use crate::error::InternalError;

const COLUMNS: &str = "id, token_hash, user_id, expires_at, last_used_at, is_revoked, revoked_at, \
                       revoked_reason, user_agent, ip_address, version, created_at";

/// Attempts before a contended rotation gives up.
const ROTATION_ATTEMPTS: usize = 3;

/// Refresh tokens in the shared `refresh_tokens` table.
///
/// Rotation relies on the partial unique index over live
/// `(user_id, ip_address, user_agent)`: a concurrent rotation that loses the
/// race hits a unique violation and retries against the new state.
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
    io_timeout: Duration,
}

impl PgRefreshTokenStore {
    pub fn new(db: &DatabaseManager) -> Self {
        Self {
            pool: db.pool().clone(),
            io_timeout: db.io_timeout(),
        }
    }

    async fn rotate(&self, new: &NewRefreshToken, now: DateTime<Utc>) -> Result<RefreshTokenRecord, sqlx::Error> {
        let mut attempt = 1;
        loop {
            match self.rotate_once(new, now).await {
                Err(e) if attempt < ROTATION_ATTEMPTS && is_unique_violation(&e) => {
                    tracing::debug!("Refresh rotation contended (attempt {}), retrying", attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn rotate_once(&self, new: &NewRefreshToken, now: DateTime<Utc>) -> Result<RefreshTokenRecord, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE refresh_tokens \
             SET is_revoked = TRUE, revoked_at = $4, revoked_reason = $5 \
             WHERE user_id = $1 AND ip_address = $2 AND user_agent = $3 AND is_revoked = FALSE",
        )
        .bind(new.user_id)
        .bind(&new.fingerprint.ip_address)
        .bind(&new.fingerprint.user_agent)
        .bind(now)
        .bind(RevokeReason::Rotated.as_str())
        .execute(&mut *tx)
        .await?;

        let insert = format!(
            "INSERT INTO refresh_tokens \
                 (id, token_hash, user_id, expires_at, user_agent, ip_address, version, created_at) \
             SELECT $1, $2, $3, $4, $5, $6, COALESCE(MAX(version), 0) + 1, $7 \
             FROM refresh_tokens WHERE user_id = $3 AND ip_address = $6 AND user_agent = $5 \
             RETURNING {}",
            COLUMNS
        );
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&insert)
            .bind(Uuid::new_v4())
            .bind(&new.token_hash)
            .bind(new.user_id)
            .bind(new.expires_at)
            .bind(&new.fingerprint.user_agent)
            .bind(&new.fingerprint.ip_address)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert_rotating(
        &self,
        new: NewRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, InternalError> {
        bounded(self.io_timeout, "rotate refresh token", self.rotate(&new, now)).await
    }

    async fn find_live(
        &self,
        token_hash: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, InternalError> {
        let sql = format!(
            "SELECT {} FROM refresh_tokens \
             WHERE token_hash = $1 AND user_id = $2 AND is_revoked = FALSE AND expires_at > $3",
            COLUMNS
        );
        bounded(
            self.io_timeout,
            "find live refresh token",
            sqlx::query_as::<_, RefreshTokenRecord>(&sql)
                .bind(token_hash)
                .bind(user_id)
                .bind(now)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, InternalError> {
        let sql = format!("SELECT {} FROM refresh_tokens WHERE token_hash = $1", COLUMNS);
        bounded(
            self.io_timeout,
            "find refresh token",
            sqlx::query_as::<_, RefreshTokenRecord>(&sql)
                .bind(token_hash)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<RefreshTokenRecord>, InternalError> {
        let sql = format!(
            "UPDATE refresh_tokens SET last_used_at = $2 \
             WHERE id = $1 AND is_revoked = FALSE AND expires_at > $2 \
             RETURNING {}",
            COLUMNS
        );
        bounded(
            self.io_timeout,
            "touch refresh token",
            sqlx::query_as::<_, RefreshTokenRecord>(&sql)
                .bind(id)
                .bind(now)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn revoke(&self, id: Uuid, reason: RevokeReason, now: DateTime<Utc>) -> Result<bool, InternalError> {
        let result = bounded(
            self.io_timeout,
            "revoke refresh token",
            sqlx::query(
                "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = $3, revoked_reason = $2 \
                 WHERE id = $1 AND is_revoked = FALSE",
            )
            .bind(id)
            .bind(reason.as_str())
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> Result<u64, InternalError> {
        let result = bounded(
            self.io_timeout,
            "revoke user refresh tokens",
            sqlx::query(
                "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = $3, revoked_reason = $2 \
                 WHERE user_id = $1 AND is_revoked = FALSE",
            )
            .bind(user_id)
            .bind(reason.as_str())
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }
}
