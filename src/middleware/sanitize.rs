use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{FromRequestParts, RawPathParams, Request},
    http::{header, request::Parts, uri::PathAndQuery, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};

use crate::security::sanitize::{sanitize_json, sanitize_urlencoded};
use crate::security::SanitizedParams;

/// Escapes markup in every string value the handler can read: the query
/// string and JSON or form bodies are rewritten in place, path parameters
/// are published as [`SanitizedParams`].
pub async fn sanitize_input(request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    sanitize_query(&mut parts);

    if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
        parts.extensions.insert(SanitizedParams::from_pairs(params.iter()));
    }

    // The threat stage already buffered and bounded the body.
    let body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => sanitize_body(&mut parts, bytes),
        Err(e) => {
            tracing::debug!("Body unavailable for sanitizing: {}", e);
            Body::empty()
        }
    };

    next.run(Request::from_parts(parts, body)).await
}

fn sanitize_query(parts: &mut Parts) {
    let Some(clean) = parts.uri.query().and_then(sanitize_urlencoded) else {
        return;
    };
    let rebuilt = PathAndQuery::try_from(format!("{}?{}", parts.uri.path(), clean))
        .ok()
        .and_then(|pq| {
            let mut uri = parts.uri.clone().into_parts();
            uri.path_and_query = Some(pq);
            Uri::from_parts(uri).ok()
        });
    match rebuilt {
        Some(uri) => parts.uri = uri,
        None => tracing::warn!("Could not rebuild sanitized query for {}", parts.uri.path()),
    }
}

fn sanitize_body(parts: &mut Parts, bytes: Bytes) -> Body {
    if bytes.is_empty() {
        return Body::from(bytes);
    }

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let rewritten = if content_type.starts_with("application/json") {
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(mut value) => {
                if sanitize_json(&mut value) {
                    serde_json::to_vec(&value).ok()
                } else {
                    None
                }
            }
            // Malformed JSON is left for the handler's extractor to reject.
            _ => None,
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(sanitize_urlencoded)
            .map(String::into_bytes)
    } else {
        None
    };

    match rewritten {
        Some(clean) => {
            parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(clean.len()));
            Body::from(clean)
        }
        None => Body::from(bytes),
    }
}
