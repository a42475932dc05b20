use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::security::ClientIp;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Correlation id for one request, echoed back in `X-Request-ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Reuse a caller-supplied id when it is short and printable.
    fn from_request(request: &Request) -> Self {
        let incoming = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 128 && v.bytes().all(|b| b.is_ascii_graphic()));
        match incoming {
            Some(id) => Self(id.to_string()),
            None => Self(Uuid::new_v4().to_string()),
        }
    }
}

/// Outermost stage: assigns the request id, derives the client address,
/// classifies the route and times the whole pipeline.
pub async fn instrument_request(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let started = Instant::now();

    let request_id = RequestId::from_request(&request);
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = ClientIp::derive(request.headers(), peer, state.settings.trust_proxy_headers);
    let spec = state.routes.lookup(request.method(), request.uri().path());

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    request.extensions_mut().insert(request_id.clone());
    request.extensions_mut().insert(client_ip);
    request.extensions_mut().insert(spec);

    let mut response = next.run(request).await;

    let elapsed = started.elapsed();
    let elapsed_ms = elapsed.as_secs_f64() * 1_000.0;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.2}ms", elapsed_ms)) {
        headers.insert(RESPONSE_TIME_HEADER, value);
    }

    let status = response.status().as_u16();
    if elapsed >= state.settings.slow_request_threshold {
        tracing::warn!(
            request_id = %request_id.0,
            client_ip = %client_ip,
            status,
            "Slow request: {} {} took {:.0}ms",
            method,
            path,
            elapsed_ms
        );
    } else {
        tracing::debug!(request_id = %request_id.0, status, "{} {} {:.2}ms", method, path, elapsed_ms);
    }

    response
}
