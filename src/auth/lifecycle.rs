//! Issuing, rotating and revoking access/refresh token pairs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::jwt::{hash_token, JwtKeys};
use super::store::RefreshTokenStore;
use super::{AccessClaims, AuthError, Identity, UserDirectory};
use crate::database::models::{DeviceFingerprint, NewRefreshToken, RevokeReason, User};

/// Tokens handed to a client after login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

/// Result of a successful refresh: a new access token only.
#[derive(Debug, Clone)]
pub struct RefreshedSession {
    pub access_token: String,
    pub claims: AccessClaims,
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeTarget {
    Token(Uuid),
    AllForUser(Uuid),
}

/// Owns refresh-token persistence and the rules around it.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    keys: Arc<JwtKeys>,
    store: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserDirectory>,
}

impl TokenLifecycleManager {
    pub fn new(keys: Arc<JwtKeys>, store: Arc<dyn RefreshTokenStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { keys, store, users }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn store(&self) -> &Arc<dyn RefreshTokenStore> {
        &self.store
    }

    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    /// Issue an access token and, if asked, a refresh token bound to
    /// `fingerprint`. A prior live refresh token for the same user and
    /// device is revoked in the same step.
    pub async fn issue_session(
        &self,
        identity: &Identity,
        fingerprint: &DeviceFingerprint,
        with_refresh: bool,
    ) -> Result<IssuedSession, AuthError> {
        let now = Utc::now();
        let claims = self.keys.access_claims(identity, now);
        let access_token = self.keys.encode_access(&claims)?;
        let access_expires_at = now + self.keys.access_ttl();

        if !with_refresh {
            tracing::debug!(user_id = %identity.user_id, "Issued access-only session");
            return Ok(IssuedSession {
                access_token,
                access_expires_at,
                refresh_token: None,
                refresh_expires_at: None,
            });
        }

        let (refresh_token, _) = self.keys.issue_refresh(identity, now)?;
        let expires_at = now + self.keys.refresh_ttl();

        let row = self
            .store
            .insert_rotating(
                NewRefreshToken {
                    token_hash: hash_token(&refresh_token),
                    user_id: identity.user_id,
                    fingerprint: fingerprint.clone(),
                    expires_at,
                },
                now,
            )
            .await?;

        tracing::info!(
            user_id = %identity.user_id,
            token_id = %row.id,
            version = row.version,
            ip = %fingerprint.ip_address,
            "Issued session with refresh token"
        );

        Ok(IssuedSession {
            access_token,
            access_expires_at,
            refresh_token: Some(refresh_token),
            refresh_expires_at: Some(expires_at),
        })
    }

    /// Mint a new access token from an expired access token and its
    /// refresh token. Every sub-failure is logged here with its reason;
    /// callers map them all to one outward error.
    pub async fn refresh_session(
        &self,
        presented_access: &str,
        presented_refresh: &str,
    ) -> Result<RefreshedSession, AuthError> {
        let result = self.try_refresh(presented_access, presented_refresh).await;
        if let Err(err) = &result {
            tracing::warn!(reason = %err, "Refresh rejected");
        }
        result
    }

    async fn try_refresh(&self, presented_access: &str, presented_refresh: &str) -> Result<RefreshedSession, AuthError> {
        let refresh_claims = self.keys.verify_refresh(presented_refresh)?;
        let user_id = refresh_claims.subject().ok_or(AuthError::InvalidRefresh)?;

        let access_claims = self
            .keys
            .decode_access_ignoring_expiry(presented_access)
            .map_err(|_| AuthError::SubjectMismatch)?;
        if access_claims.subject() != Some(user_id) {
            return Err(AuthError::SubjectMismatch);
        }

        let now = Utc::now();
        let row = self
            .store
            .find_live(&hash_token(presented_refresh), user_id, now)
            .await?
            .ok_or(AuthError::InvalidRefresh)?;

        let user = self
            .users
            .find_active_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::InactiveUser)?;

        // Lost a race with a concurrent revoke or rotation
        let touched = self.store.touch(row.id, now).await?.ok_or(AuthError::InvalidRefresh)?;

        let claims = self.keys.access_claims(&Identity::user(user.id), now);
        let access_token = self.keys.encode_access(&claims)?;

        tracing::info!(
            user_id = %user.id,
            token_id = %touched.id,
            "Refreshed access token"
        );

        Ok(RefreshedSession {
            access_token,
            claims,
            user,
        })
    }

    /// Revoke by id or for a whole user. Idempotent; returns how many rows
    /// this call revoked.
    pub async fn revoke(&self, target: RevokeTarget, reason: RevokeReason) -> Result<u64, AuthError> {
        let now = Utc::now();
        let count = match target {
            RevokeTarget::Token(id) => u64::from(self.store.revoke(id, reason, now).await?),
            RevokeTarget::AllForUser(user_id) => self.store.revoke_all_for_user(user_id, reason, now).await?,
        };
        tracing::info!(?target, reason = reason.as_str(), count, "Revoked refresh tokens");
        Ok(count)
    }

    /// Revoke the row behind a presented refresh token, if it belongs to
    /// `user_id`. Unknown tokens are not an error.
    pub async fn revoke_presented(
        &self,
        user_id: Uuid,
        presented_refresh: &str,
        reason: RevokeReason,
    ) -> Result<u64, AuthError> {
        match self.store.find_by_hash(&hash_token(presented_refresh)).await? {
            Some(row) if row.user_id == user_id => self.revoke(RevokeTarget::Token(row.id), reason).await,
            Some(_) => {
                tracing::warn!(%user_id, "Logout presented another user's refresh token");
                Ok(0)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryRefreshTokenStore;
    use crate::error::InternalError;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Users(Mutex<Vec<User>>);

    impl Users {
        fn with(user: User) -> Self {
            Self(Mutex::new(vec![user]))
        }

        fn deactivate(&self, id: Uuid) {
            for u in self.0.lock().unwrap().iter_mut().filter(|u| u.id == id) {
                u.is_active = false;
            }
        }
    }

    #[async_trait]
    impl UserDirectory for Users {
        async fn find_active_by_id(&self, id: Uuid) -> Result<Option<User>, InternalError> {
            Ok(self.0.lock().unwrap().iter().find(|u| u.id == id && u.is_active).cloned())
        }

        async fn verify_credentials(&self, _: &str, _: &str) -> Result<Option<User>, InternalError> {
            Ok(None)
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            name: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    struct Fixture {
        manager: TokenLifecycleManager,
        store: Arc<MemoryRefreshTokenStore>,
        users: Arc<Users>,
        keys: Arc<JwtKeys>,
        user: User,
    }

    fn fixture() -> Fixture {
        let user = user();
        let keys = Arc::new(JwtKeys::new(b"a", b"r", Duration::minutes(10), Duration::days(7)));
        let store = Arc::new(MemoryRefreshTokenStore::new());
        let users = Arc::new(Users::with(user.clone()));
        let manager = TokenLifecycleManager::new(keys.clone(), store.clone(), users.clone());
        Fixture {
            manager,
            store,
            users,
            keys,
            user,
        }
    }

    fn expired_access(keys: &JwtKeys, user_id: Uuid) -> String {
        let claims = keys.access_claims(&Identity::user(user_id), Utc::now() - Duration::hours(1));
        keys.encode_access(&claims).unwrap()
    }

    fn device() -> DeviceFingerprint {
        DeviceFingerprint::new("203.0.113.9", "test-agent")
    }

    #[tokio::test]
    async fn refresh_advances_last_used_and_issues_access_only() {
        let f = fixture();
        let session = f.manager.issue_session(&Identity::user(f.user.id), &device(), true).await.unwrap();
        let refresh = session.refresh_token.unwrap();
        let row_id = f.store.all_for_user(f.user.id)[0].id;
        assert!(f.store.snapshot(row_id).unwrap().last_used_at.is_none());

        let refreshed = f
            .manager
            .refresh_session(&expired_access(&f.keys, f.user.id), &refresh)
            .await
            .unwrap();

        assert_eq!(refreshed.user.id, f.user.id);
        assert!(refreshed.claims.tenant_id.is_none());
        assert!(f.keys.verify_access(&refreshed.access_token).is_ok());
        assert!(f.store.snapshot(row_id).unwrap().last_used_at.is_some());
    }

    #[tokio::test]
    async fn access_only_session_persists_nothing() {
        let f = fixture();
        let session = f.manager.issue_session(&Identity::user(f.user.id), &device(), false).await.unwrap();
        assert!(session.refresh_token.is_none());
        assert!(f.store.all_for_user(f.user.id).is_empty());
    }

    #[tokio::test]
    async fn rotated_token_is_rejected_without_mutation() {
        let f = fixture();
        let id = Identity::user(f.user.id);
        let first = f.manager.issue_session(&id, &device(), true).await.unwrap();
        f.manager.issue_session(&id, &device(), true).await.unwrap();

        let before = f.store.all_for_user(f.user.id);
        let err = f
            .manager
            .refresh_session(&expired_access(&f.keys, f.user.id), &first.refresh_token.unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidRefresh);

        let after = f.store.all_for_user(f.user.id);
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.last_used_at, a.last_used_at);
            assert_eq!(b.is_revoked, a.is_revoked);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_logins_on_one_device_leave_one_live_token() {
        let f = fixture();
        let id = Identity::user(f.user.id);
        let (device_a, device_b) = (device(), device());
        let (a, b) = tokio::join!(
            f.manager.issue_session(&id, &device_a, true),
            f.manager.issue_session(&id, &device_b, true),
        );
        let (a, b) = (a.unwrap().refresh_token.unwrap(), b.unwrap().refresh_token.unwrap());

        let rows = f.store.all_for_user(f.user.id);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().filter(|r| !r.is_revoked).count(), 1);
        assert_eq!(rows.iter().filter(|r| r.revoked_reason.as_deref() == Some("rotated")).count(), 1);

        let access = expired_access(&f.keys, f.user.id);
        let outcomes = [
            f.manager.refresh_session(&access, &a).await.is_ok(),
            f.manager.refresh_session(&access, &b).await.is_ok(),
        ];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    }

    #[tokio::test]
    async fn access_token_must_belong_to_refresh_subject() {
        let f = fixture();
        let session = f.manager.issue_session(&Identity::user(f.user.id), &device(), true).await.unwrap();
        let err = f
            .manager
            .refresh_session(&expired_access(&f.keys, Uuid::new_v4()), &session.refresh_token.unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SubjectMismatch);
    }

    #[tokio::test]
    async fn inactive_user_cannot_refresh() {
        let f = fixture();
        let session = f.manager.issue_session(&Identity::user(f.user.id), &device(), true).await.unwrap();
        f.users.deactivate(f.user.id);
        let err = f
            .manager
            .refresh_session(&expired_access(&f.keys, f.user.id), &session.refresh_token.unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InactiveUser);
    }

    #[tokio::test]
    async fn garbage_refresh_token_is_invalid() {
        let f = fixture();
        let err = f
            .manager
            .refresh_session(&expired_access(&f.keys, f.user.id), "nope")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidRefresh);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let f = fixture();
        let id = Identity::user(f.user.id);
        let session = f.manager.issue_session(&id, &device(), true).await.unwrap();
        f.manager
            .issue_session(&id, &DeviceFingerprint::new("198.51.100.1", "phone"), true)
            .await
            .unwrap();

        let refresh = session.refresh_token.unwrap();
        assert_eq!(f.manager.revoke_presented(f.user.id, &refresh, RevokeReason::Logout).await.unwrap(), 1);
        assert_eq!(f.manager.revoke_presented(f.user.id, &refresh, RevokeReason::Logout).await.unwrap(), 0);

        let all = RevokeTarget::AllForUser(f.user.id);
        assert_eq!(f.manager.revoke(all, RevokeReason::PasswordChange).await.unwrap(), 1);
        assert_eq!(f.manager.revoke(all, RevokeReason::PasswordChange).await.unwrap(), 0);
    }
}
