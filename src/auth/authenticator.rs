use std::sync::Arc;

use axum::http::{header, HeaderMap};

use super::jwt::JwtKeys;
use super::lifecycle::TokenLifecycleManager;
use super::{AuthError, Identity};

/// Request header carrying the refresh token alongside an expired bearer.
pub const REFRESH_TOKEN_HEADER: &str = "refreshtoken";

/// Response header carrying an access token minted during the request.
pub const ACCESS_TOKEN_RESPONSE_HEADER: &str = "x-access-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(Identity),
    /// The bearer had expired and was replaced; the client should store
    /// `access_token`.
    Refreshed { identity: Identity, access_token: String },
}

impl AuthOutcome {
    pub fn identity(&self) -> &Identity {
        match self {
            AuthOutcome::Authenticated(identity) => identity,
            AuthOutcome::Refreshed { identity, .. } => identity,
        }
    }
}

/// Validates bearer access tokens, falling back to a refresh on expiry.
#[derive(Clone)]
pub struct TokenAuthenticator {
    keys: Arc<JwtKeys>,
    lifecycle: TokenLifecycleManager,
}

impl TokenAuthenticator {
    pub fn new(keys: Arc<JwtKeys>, lifecycle: TokenLifecycleManager) -> Self {
        Self { keys, lifecycle }
    }

    pub fn lifecycle(&self) -> &TokenLifecycleManager {
        &self.lifecycle
    }

    /// NoToken -> MissingToken; valid -> Authenticated; expired with a
    /// refresh header -> Refreshed or InvalidRefresh; anything else fails
    /// without a refresh attempt.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthOutcome, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;

        match self.keys.verify_access(token) {
            Ok(claims) => Identity::from_claims(&claims)
                .map(AuthOutcome::Authenticated)
                .ok_or(AuthError::InvalidSignature),
            Err(AuthError::ExpiredToken) => {
                let Some(refresh) = header_str(headers, REFRESH_TOKEN_HEADER) else {
                    return Err(AuthError::ExpiredToken);
                };
                let refreshed = self.lifecycle.refresh_session(token, refresh).await?;
                let identity = Identity::from_claims(&refreshed.claims).ok_or(AuthError::InvalidRefresh)?;
                Ok(AuthOutcome::Refreshed {
                    identity,
                    access_token: refreshed.access_token,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Identity for keying rate limits before authentication has run.
    /// Signature must hold; expiry is ignored.
    pub fn peek_identity(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = bearer_token(headers)?;
        let claims = self.keys.decode_access_ignoring_expiry(token).ok()?;
        Identity::from_claims(&claims)
    }
}

/// Token from `Authorization: Bearer <token>`. The scheme is matched
/// case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = header_str(headers, header::AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
