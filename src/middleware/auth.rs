use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::routes::{Access, RouteSpec};
use crate::app::AppState;
use crate::auth::{AuthOutcome, ACCESS_TOKEN_RESPONSE_HEADER};
use crate::error::ApiError;

/// Attaches the caller's [`Identity`](crate::auth::Identity) on protected
/// routes. An expired access token presented together with a live refresh
/// token is renewed transparently; the new token goes back in
/// `x-access-token`.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let spec = request.extensions().get::<RouteSpec>().copied().unwrap_or_default();
    if spec.access == Access::Public {
        return next.run(request).await;
    }

    let outcome = match state.authenticator.authenticate(request.headers()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::debug!("Authentication failed on {}: {}", request.uri().path(), e);
            return ApiError::from(e).at(request.uri().path()).into_response();
        }
    };

    match outcome {
        AuthOutcome::Authenticated(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        AuthOutcome::Refreshed { identity, access_token } => {
            request.extensions_mut().insert(identity);
            let mut response = next.run(request).await;
            match HeaderValue::from_str(&access_token) {
                Ok(value) => {
                    response.headers_mut().insert(ACCESS_TOKEN_RESPONSE_HEADER, value);
                }
                Err(e) => tracing::error!("Refreshed access token is not a valid header value: {}", e),
            }
            response
        }
    }
}
