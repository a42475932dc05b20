use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;

/// Answers every preflight with 204 and decorates all other responses,
/// error envelopes included, with the allow-list headers.
pub async fn cors_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        response.headers_mut().extend(state.cors.preflight(request.headers()));
        return response;
    }

    let origin = request.headers().get(header::ORIGIN).cloned();
    let mut response = next.run(request).await;
    state.cors.apply(origin.as_ref(), response.headers_mut());
    response
}
