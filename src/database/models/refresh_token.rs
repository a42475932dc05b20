use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The (IP, user-agent) pair that scopes refresh-token rotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub ip_address: String,
    pub user_agent: String,
}

impl DeviceFingerprint {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Persisted refresh token. Only the SHA-256 of the token is stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub user_agent: String,
    pub ip_address: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn fingerprint(&self) -> DeviceFingerprint {
        DeviceFingerprint::new(self.ip_address.clone(), self.user_agent.clone())
    }

    /// Usable for a refresh at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

/// Row to insert when a session is issued.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_hash: String,
    pub user_id: Uuid,
    pub fingerprint: DeviceFingerprint,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    Logout,
    PasswordChange,
    Rotated,
    Administrative,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::Logout => "logout",
            RevokeReason::PasswordChange => "password_change",
            RevokeReason::Rotated => "rotated",
            RevokeReason::Administrative => "administrative",
        }
    }
}

impl std::str::FromStr for RevokeReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logout" => Ok(RevokeReason::Logout),
            "password_change" => Ok(RevokeReason::PasswordChange),
            "rotated" => Ok(RevokeReason::Rotated),
            "administrative" | "admin" => Ok(RevokeReason::Administrative),
            other => Err(format!("unknown revoke reason '{}'", other)),
        }
    }
}
