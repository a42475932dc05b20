use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ACCESS_TOKEN_USE: &str = "access";
pub const REFRESH_TOKEN_USE: &str = "refresh";

/// Claims of a short-lived access token. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub token_use: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a refresh token. `jti` carries the random opaque part; the
/// token as a whole is only ever stored as a hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub token_use: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn subject(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

impl RefreshClaims {
    pub fn subject(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}
