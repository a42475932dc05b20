use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::security::ClientIp;

/// Screens the path, query and body for attack signatures.
///
/// The body is buffered here, once, against the configured size ceiling;
/// later stages see the same bytes. A hit flags the client address and
/// ends the request with 403.
pub async fn threat_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let client_ip = request.extensions().get::<ClientIp>().copied().unwrap_or(ClientIp(None));

    if let Some(ip) = client_ip.ip() {
        if state.suspicious.is_suspicious(ip).await {
            if state.settings.block_suspicious_ips {
                tracing::warn!(%ip, "Blocked request from flagged address: {}", path);
                return ApiError::threat_detected().at(path).into_response();
            }
            tracing::debug!(%ip, "Request from flagged address: {}", path);
        }
    }

    let limit = state.settings.max_request_size_bytes;
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return ApiError::payload_too_large(limit).at(path).into_response();
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!("Request body rejected: {}", e);
            return ApiError::payload_too_large(limit).at(path).into_response();
        }
    };

    let body_text = (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes));
    if let Some(signature) = state
        .threats
        .inspect(parts.uri.path(), parts.uri.query(), body_text.as_deref())
    {
        tracing::warn!(
            client_ip = %client_ip,
            signature,
            "Threat signature matched on {} {}",
            parts.method,
            path
        );
        if let Some(ip) = client_ip.ip() {
            state.suspicious.mark(ip, signature).await;
        }
        return ApiError::threat_detected().at(path).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
