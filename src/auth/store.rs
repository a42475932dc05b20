use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::models::{NewRefreshToken, RefreshTokenRecord, RevokeReason};
use crate::error::InternalError;

/// Persistence for refresh tokens.
///
/// Every write is conditional on the row still being live, so a caller
/// that loses a race sees `None`/`false` instead of overwriting newer state.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Revoke any live token for the same user and device, then insert
    /// `new`, as one atomic step.
    async fn insert_rotating(
        &self,
        new: NewRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, InternalError>;

    /// Live row (not revoked, not expired at `now`) for this hash and user.
    async fn find_live(
        &self,
        token_hash: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, InternalError>;

    /// Row for this hash regardless of state.
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, InternalError>;

    /// Set `last_used_at` if the row is still live. `None` means it was
    /// revoked or expired in the meantime.
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<RefreshTokenRecord>, InternalError>;

    /// Revoke one token. Returns whether this call revoked it.
    async fn revoke(&self, id: Uuid, reason: RevokeReason, now: DateTime<Utc>) -> Result<bool, InternalError>;

    /// Revoke every live token of a user. Returns how many were revoked.
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> Result<u64, InternalError>;
}

/// Process-local store for single-instance deployments and tests.
#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    rows: Mutex<HashMap<Uuid, RefreshTokenRecord>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, RefreshTokenRecord>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self, id: Uuid) -> Option<RefreshTokenRecord> {
        self.rows().get(&id).cloned()
    }

    pub fn all_for_user(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        let mut rows: Vec<_> = self.rows().values().filter(|r| r.user_id == user_id).cloned().collect();
        rows.sort_by_key(|r| r.created_at);
        rows
    }
}

fn mark_revoked(row: &mut RefreshTokenRecord, reason: RevokeReason, now: DateTime<Utc>) {
    row.is_revoked = true;
    row.revoked_at = Some(now);
    row.revoked_reason = Some(reason.as_str().to_string());
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn insert_rotating(
        &self,
        new: NewRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, InternalError> {
        let mut rows = self.rows();
        let mut version = 0;
        for row in rows.values_mut() {
            if row.user_id == new.user_id && row.fingerprint() == new.fingerprint {
                version = version.max(row.version);
                if !row.is_revoked {
                    mark_revoked(row, RevokeReason::Rotated, now);
                }
            }
        }

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            token_hash: new.token_hash,
            user_id: new.user_id,
            expires_at: new.expires_at,
            last_used_at: None,
            is_revoked: false,
            revoked_at: None,
            revoked_reason: None,
            user_agent: new.fingerprint.user_agent,
            ip_address: new.fingerprint.ip_address,
            version: version + 1,
            created_at: now,
        };
        rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_live(
        &self,
        token_hash: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, InternalError> {
        Ok(self
            .rows()
            .values()
            .find(|r| r.token_hash == token_hash && r.user_id == user_id && r.is_live(now))
            .cloned())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, InternalError> {
        Ok(self.rows().values().find(|r| r.token_hash == token_hash).cloned())
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<RefreshTokenRecord>, InternalError> {
        let mut rows = self.rows();
        match rows.get_mut(&id) {
            Some(row) if row.is_live(now) => {
                row.last_used_at = Some(now);
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revoke(&self, id: Uuid, reason: RevokeReason, now: DateTime<Utc>) -> Result<bool, InternalError> {
        let mut rows = self.rows();
        match rows.get_mut(&id) {
            Some(row) if !row.is_revoked => {
                mark_revoked(row, reason, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> Result<u64, InternalError> {
        let mut count = 0;
        for row in self.rows().values_mut() {
            if row.user_id == user_id && !row.is_revoked {
                mark_revoked(row, reason, now);
                count += 1;
            }
        }
        Ok(count)
    }
}
