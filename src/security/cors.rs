use axum::http::{header, HeaderMap, HeaderValue};

const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, refreshtoken, x-workspace-slug, X-Request-ID";
const EXPOSE_HEADERS: &str = "X-RateLimit-Limit, X-RateLimit-Remaining, X-RateLimit-Reset, Retry-After, \
                              X-Request-ID, X-Response-Time, x-access-token";
const MAX_AGE_SECS: u32 = 600;

/// Origin allow-list. `*` in the list admits any origin (the origin is
/// still echoed, since credentials are allowed).
#[derive(Debug, Clone, Default)]
pub struct CorsPolicyGuard {
    origins: Vec<String>,
    any_origin: bool,
}

impl CorsPolicyGuard {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut guard = Self::default();
        for origin in origins {
            let origin = origin.as_ref().trim().trim_end_matches('/');
            if origin == "*" {
                guard.any_origin = true;
            } else if !origin.is_empty() {
                guard.origins.push(origin.to_ascii_lowercase());
            }
        }
        guard
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/').to_ascii_lowercase();
        self.any_origin || self.origins.iter().any(|o| *o == origin)
    }

    /// The request's `Origin`, if it is on the list.
    pub fn allowed_origin<'a>(&self, headers: &'a HeaderMap) -> Option<&'a HeaderValue> {
        let value = headers.get(header::ORIGIN)?;
        let origin = value.to_str().ok()?;
        self.is_allowed(origin).then_some(value)
    }

    /// Headers for an actual (non-preflight) response to a request that
    /// carried `origin`.
    pub fn apply(&self, origin: Option<&HeaderValue>, response_headers: &mut HeaderMap) {
        response_headers.append(header::VARY, HeaderValue::from_static("Origin"));
        let allowed = origin.filter(|o| o.to_str().map_or(false, |o| self.is_allowed(o)));
        if let Some(origin) = allowed {
            response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            response_headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            response_headers.insert(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(EXPOSE_HEADERS),
            );
        }
    }

    /// Headers for a preflight answer. Unknown origins get none, which the
    /// browser treats as a refusal.
    pub fn preflight(&self, request_headers: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        if let Some(origin) = self.allowed_origin(request_headers) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(MAX_AGE_SECS));
        }
        headers
    }
}
