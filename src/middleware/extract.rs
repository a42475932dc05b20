//! Handler extractors for what the pipeline attached to the request.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::auth::{AuthError, Identity};
use crate::error::ApiError;
use crate::security::{ClientIp, SanitizedParams};
use crate::tenant::{TenantContext, TenantError};

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::from(AuthError::MissingToken).at(parts.uri.path()))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for TenantContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or_else(|| ApiError::from(TenantError::MissingTenant).at(parts.uri.path()))
    }
}

/// Never rejects; an unidentified peer is `ClientIp(None)`.
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<ClientIp>().copied().unwrap_or_default())
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SanitizedParams {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<SanitizedParams>().cloned().unwrap_or_default())
    }
}
