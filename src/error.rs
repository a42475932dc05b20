// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::AuthError;
use crate::security::rate_limit::RateLimitExceeded;
use crate::tenant::{TenantError, ValidationError};

/// Infrastructure failure behind one of the pipeline's collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("operation timed out: {0}")]
    TimedOut(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Outward-facing error classes. Each one has a stable `errorCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // 400 Bad Request
    BadRequest,
    MissingTenant,
    MalformedSlug,

    // 401 Unauthorized
    MissingToken,
    InvalidSignature,
    ExpiredToken,
    InvalidRefresh,
    Unauthorized,

    // 403 Forbidden
    TenantInactive,
    ThreatDetected,

    // 404 Not Found
    TenantNotFound,
    NotFound,

    // 413 Payload Too Large
    PayloadTooLarge,

    // 429 Too Many Requests
    RateLimitExceeded { retry_after_secs: u64 },

    // 500 Internal Server Error
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::BadRequest | ErrorKind::MissingTenant | ErrorKind::MalformedSlug => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::MissingToken
            | ErrorKind::InvalidSignature
            | ErrorKind::ExpiredToken
            | ErrorKind::InvalidRefresh
            | ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::TenantInactive | ErrorKind::ThreatDetected => StatusCode::FORBIDDEN,
            ErrorKind::TenantNotFound | ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::MissingTenant => "MISSING_TENANT",
            ErrorKind::MalformedSlug => "MALFORMED_SLUG",
            ErrorKind::MissingToken => "MISSING_TOKEN",
            ErrorKind::InvalidSignature => "INVALID_SIGNATURE",
            ErrorKind::ExpiredToken => "EXPIRED_TOKEN",
            ErrorKind::InvalidRefresh => "INVALID_REFRESH",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::TenantInactive => "TENANT_INACTIVE",
            ErrorKind::ThreatDetected => "THREAT_DETECTED",
            ErrorKind::TenantNotFound => "TENANT_NOT_FOUND",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorKind::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// HTTP API error rendered as the structured JSON envelope
/// `{status, statusCode, message, errorCode, timestamp, path}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub path: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
        }
    }

    /// Attach the request path the error occurred on.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    pub fn error_code(&self) -> &'static str {
        self.kind.error_code()
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "status": "error",
            "statusCode": self.status_code().as_u16(),
            "message": self.message,
            "errorCode": self.error_code(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "path": self.path.as_deref().unwrap_or(""),
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn threat_detected() -> Self {
        Self::new(ErrorKind::ThreatDetected, "Request blocked")
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            ErrorKind::PayloadTooLarge,
            format!("Request body exceeds {} bytes", limit),
        )
    }

    pub fn internal() -> Self {
        Self::new(ErrorKind::Internal, "An internal error occurred")
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => {
                ApiError::new(ErrorKind::MissingToken, "Authorization bearer token required")
            }
            AuthError::InvalidSignature => {
                ApiError::new(ErrorKind::InvalidSignature, "Invalid access token")
            }
            AuthError::ExpiredToken => ApiError::new(ErrorKind::ExpiredToken, "Access token expired"),
            // Refresh sub-failures are indistinguishable from the outside
            AuthError::InvalidRefresh | AuthError::SubjectMismatch | AuthError::InactiveUser => {
                ApiError::new(ErrorKind::InvalidRefresh, "Invalid or expired refresh token")
            }
            AuthError::InvalidCredentials => ApiError::unauthorized("Invalid credentials"),
            AuthError::Internal(e) => e.into(),
        }
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::MissingTenant => {
                ApiError::new(ErrorKind::MissingTenant, "Workspace identifier required")
            }
            TenantError::TenantNotFound(slug) => ApiError::new(
                ErrorKind::TenantNotFound,
                format!("Workspace '{}' not found", slug),
            ),
            TenantError::TenantInactive(slug) => ApiError::new(
                ErrorKind::TenantInactive,
                format!("Workspace '{}' is not active", slug),
            ),
            TenantError::Validation(e) => e.into(),
            TenantError::Internal(e) => e.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MalformedSlug(_) => {
                ApiError::new(ErrorKind::MalformedSlug, "Malformed workspace identifier")
            }
        }
    }
}

impl From<RateLimitExceeded> for ApiError {
    fn from(err: RateLimitExceeded) -> Self {
        ApiError::new(
            ErrorKind::RateLimitExceeded {
                retry_after_secs: err.retry_after_secs,
            },
            "Too many requests, please try again later",
        )
    }
}

impl From<InternalError> for ApiError {
    fn from(err: InternalError) -> Self {
        // Log the real error but return generic message
        tracing::error!("Internal error: {}", err);
        ApiError::internal()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message)
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status_code(), Json(self.to_json())).into_response();
        if let ErrorKind::RateLimitExceeded { retry_after_secs } = self.kind {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}
