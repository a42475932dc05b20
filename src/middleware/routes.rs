//! Per-route pipeline requirements.
//!
//! Every request is classified once, up front, and the resulting
//! [`RouteSpec`] rides along as a request extension so later stages agree
//! on what the route needs.

use axum::http::Method;

use crate::security::rate_limit::RateClass;
use crate::tenant::RouteClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    pub access: Access,
    pub tenant: RouteClass,
    pub rate: RateClass,
    /// Let an inactive workspace through tenant resolution.
    pub allow_inactive_tenant: bool,
}

impl RouteSpec {
    pub const fn public(rate: RateClass) -> Self {
        Self {
            access: Access::Public,
            tenant: RouteClass::Public,
            rate,
            allow_inactive_tenant: false,
        }
    }

    pub const fn authenticated(tenant: RouteClass) -> Self {
        Self {
            access: Access::Authenticated,
            tenant,
            rate: RateClass::Standard,
            allow_inactive_tenant: false,
        }
    }

    pub const fn allowing_inactive_tenant(mut self) -> Self {
        self.allow_inactive_tenant = true;
        self
    }
}

impl Default for RouteSpec {
    fn default() -> Self {
        Self::authenticated(RouteClass::Optional)
    }
}

#[derive(Debug, Clone)]
struct RouteRule {
    method: Option<Method>,
    prefix: String,
    spec: RouteSpec,
}

impl RouteRule {
    fn matches(&self, method: &Method, path: &str) -> bool {
        if self.method.as_ref().is_some_and(|m| m != method) {
            return false;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/'),
            None => false,
        }
    }
}

/// Ordered (method, path prefix) table. First match wins; unmatched
/// routes get [`RouteSpec::default`].
#[derive(Debug, Clone, Default)]
pub struct RouteCatalog {
    rules: Vec<RouteRule>,
}

impl RouteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, method: Option<Method>, prefix: impl Into<String>, spec: RouteSpec) -> Self {
        self.rules.push(RouteRule {
            method,
            prefix: prefix.into(),
            spec,
        });
        self
    }

    pub fn lookup(&self, method: &Method, path: &str) -> RouteSpec {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| rule.spec)
            .unwrap_or_default()
    }

    /// Requirements for the routes this service mounts.
    pub fn standard() -> Self {
        Self::new()
            .rule(Some(Method::GET), "/health", RouteSpec::public(RateClass::Standard))
            .rule(Some(Method::POST), "/auth/login", RouteSpec::public(RateClass::Auth))
            .rule(Some(Method::POST), "/auth/refresh", RouteSpec::public(RateClass::Standard))
            .rule(None, "/auth/logout", RouteSpec::authenticated(RouteClass::Public))
            .rule(None, "/api/auth", RouteSpec::authenticated(RouteClass::Optional))
            .rule(
                Some(Method::POST),
                "/api/workspace/reactivate",
                RouteSpec::authenticated(RouteClass::Required).allowing_inactive_tenant(),
            )
            .rule(None, "/api/workspace", RouteSpec::authenticated(RouteClass::Required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        let catalog = RouteCatalog::standard();

        let reactivate = catalog.lookup(&Method::POST, "/api/workspace/reactivate");
        assert_eq!(reactivate.tenant, RouteClass::Required);
        assert!(reactivate.allow_inactive_tenant);

        let current = catalog.lookup(&Method::GET, "/api/workspace");
        assert!(!current.allow_inactive_tenant);
        assert_eq!(current.access, Access::Authenticated);
    }

    #[test]
    fn prefixes_match_whole_segments() {
        let catalog = RouteCatalog::standard();
        assert_eq!(catalog.lookup(&Method::POST, "/auth/login").rate, RateClass::Auth);
        // "/auth/loginx" is not under "/auth/login"
        assert_eq!(catalog.lookup(&Method::POST, "/auth/loginx"), RouteSpec::default());
    }

    #[test]
    fn method_restricts_rule() {
        let catalog = RouteCatalog::standard();
        assert_eq!(catalog.lookup(&Method::GET, "/health").access, Access::Public);
        assert_eq!(catalog.lookup(&Method::DELETE, "/health").access, Access::Authenticated);
    }
}
