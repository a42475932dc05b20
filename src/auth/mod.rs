pub mod authenticator;
pub mod claims;
pub mod jwt;
pub mod lifecycle;
pub mod store;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::User;
use crate::error::InternalError;

pub use authenticator::{AuthOutcome, TokenAuthenticator, ACCESS_TOKEN_RESPONSE_HEADER, REFRESH_TOKEN_HEADER};
pub use claims::{AccessClaims, RefreshClaims};
pub use jwt::{hash_token, JwtKeys};
pub use lifecycle::{IssuedSession, RefreshedSession, RevokeTarget, TokenLifecycleManager};
pub use store::{MemoryRefreshTokenStore, RefreshTokenStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token signature or shape")]
    InvalidSignature,

    #[error("access token expired")]
    ExpiredToken,

    #[error("refresh token invalid, revoked or expired")]
    InvalidRefresh,

    #[error("access and refresh token subjects differ")]
    SubjectMismatch,

    #[error("user missing or inactive")]
    InactiveUser,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Authenticated caller attached to the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub role: Option<String>,
}

impl Identity {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            tenant_id: None,
            member_id: None,
            role: None,
        }
    }

    pub fn from_claims(claims: &AccessClaims) -> Option<Self> {
        Some(Self {
            user_id: claims.subject()?,
            tenant_id: claims.tenant_id,
            member_id: claims.member_id,
            role: claims.role.clone(),
        })
    }
}

/// Read access to user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<User>, InternalError>;

    /// Check a password against the stored hash; returns the active user on
    /// a match. Hashing is owned by the directory.
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>, InternalError>;
}
