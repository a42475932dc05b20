//! Signing and verification of access and refresh tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use super::claims::{AccessClaims, RefreshClaims, ACCESS_TOKEN_USE, REFRESH_TOKEN_USE};
use super::{AuthError, Identity};
use crate::config::SecurityConfig;
use crate::error::InternalError;

/// Signing material and lifetimes for both token kinds.
pub struct JwtKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        Self::new(
            security.jwt_secret.as_bytes(),
            security.refresh_secret.as_bytes(),
            Duration::seconds(security.access_token_ttl_secs),
            Duration::days(security.refresh_token_ttl_days),
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Claims for a fresh access token issued at `now`.
    pub fn access_claims(&self, identity: &Identity, now: DateTime<Utc>) -> AccessClaims {
        AccessClaims {
            sub: identity.user_id.to_string(),
            tenant_id: identity.tenant_id,
            member_id: identity.member_id,
            role: identity.role.clone(),
            token_use: ACCESS_TOKEN_USE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        }
    }

    pub fn encode_access(&self, claims: &AccessClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.access_encoding)
            .map_err(|e| AuthError::Internal(InternalError::Signing(e.to_string())))
    }

    /// Full validation: signature, expiry (zero leeway) and required claims.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims = decode::<AccessClaims>(token, &self.access_decoding, &strict_validation())
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidSignature,
            })?
            .claims;
        check_access_shape(claims)
    }

    /// Signature-checked decode that ignores `exp`. Used to bind an expired
    /// access token to its refresh token and to key rate limits.
    pub fn decode_access_ignoring_expiry(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = strict_validation();
        validation.validate_exp = false;
        let claims = decode::<AccessClaims>(token, &self.access_decoding, &validation)
            .map_err(|_| AuthError::InvalidSignature)?
            .claims;
        check_access_shape(claims)
    }

    /// Mint a refresh token for `user_id`. Returns the token and its claims.
    pub fn issue_refresh(&self, identity: &Identity, now: DateTime<Utc>) -> Result<(String, RefreshClaims), AuthError> {
        let claims = RefreshClaims {
            sub: identity.user_id.to_string(),
            jti: random_token_id(),
            token_use: REFRESH_TOKEN_USE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| AuthError::Internal(InternalError::Signing(e.to_string())))?;
        Ok((token, claims))
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims = decode::<RefreshClaims>(token, &self.refresh_decoding, &strict_validation())
            .map_err(|_| AuthError::InvalidRefresh)?
            .claims;
        if claims.token_use != REFRESH_TOKEN_USE || claims.subject().is_none() {
            return Err(AuthError::InvalidRefresh);
        }
        Ok(claims)
    }
}

fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

fn check_access_shape(claims: AccessClaims) -> Result<AccessClaims, AuthError> {
    if claims.token_use != ACCESS_TOKEN_USE || claims.subject().is_none() {
        return Err(AuthError::InvalidSignature);
    }
    Ok(claims)
}

/// 256 bits from the OS CSPRNG, URL-safe base64.
fn random_token_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One-way hash of a presented refresh token (SHA-256, lowercase hex).
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
