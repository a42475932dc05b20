use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::routes::RouteSpec;
use crate::app::AppState;
use crate::error::ApiError;
use crate::security::rate_limit::{rate_limit_key, RateLimitDecision};
use crate::security::ClientIp;
use crate::tenant::{Plan, RouteClass};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Counts the request before anything expensive runs.
///
/// Authentication and tenant resolution have not happened yet, so the
/// caller and workspace used for the key are peeked from the headers: a
/// correctly signed token (expired or not) and a known workspace slug.
/// Neither is trusted for anything else.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.rate_limiter.is_enabled() {
        return next.run(request).await;
    }

    let spec = request.extensions().get::<RouteSpec>().copied().unwrap_or_default();
    let client_ip = request.extensions().get::<ClientIp>().copied().unwrap_or(ClientIp(None));
    let endpoint = format!(
        "{} {}",
        request.method(),
        request
            .extensions()
            .get::<MatchedPath>()
            .map(|m| m.as_str())
            .unwrap_or_else(|| request.uri().path())
    );

    let user_id = state.authenticator.peek_identity(request.headers()).map(|i| i.user_id);
    let tenant = match spec.tenant {
        RouteClass::Public => None,
        RouteClass::Optional | RouteClass::Required => state.tenants.peek(request.headers()).await,
    };
    let plan = tenant.as_ref().map_or(Plan::Free, |t| t.plan);

    let key = rate_limit_key(
        tenant.as_ref().map(|t| t.tenant_id),
        &client_ip.to_string(),
        user_id,
        &endpoint,
    );
    let policy = state.rate_limiter.policies().select(spec.rate, request.method(), plan);

    let Some(decision) = state.rate_limiter.check(&key, &policy).await else {
        return next.run(request).await;
    };

    if let Some(exceeded) = decision.exceeded() {
        let mut response = ApiError::from(exceeded).at(request.uri().path()).into_response();
        apply_headers(&decision, response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&decision, response.headers_mut());
    response
}

fn apply_headers(decision: &RateLimitDecision, headers: &mut HeaderMap) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at.timestamp()));
}
