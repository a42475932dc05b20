use std::net::IpAddr;
use std::sync::Arc;

use axum::http::{header, HeaderMap};

use super::{RouteClass, TenantCache, TenantContext, TenantDirectory, TenantError, TenantSlug};
use crate::error::InternalError;

pub const WORKSPACE_HEADER: &str = "x-workspace-slug";

/// Subdomains that never name a workspace.
const RESERVED_SUBDOMAINS: &[&str] = &["www", "api", "app", "admin", "static"];

/// Derives the workspace for a request and loads its context.
pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
    base_domain: Option<String>,
    cache: TenantCache,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>, base_domain: Option<String>, cache: TenantCache) -> Self {
        Self {
            directory,
            base_domain: base_domain.map(|d| d.trim_start_matches('.').to_ascii_lowercase()),
            cache,
        }
    }

    pub fn directory(&self) -> &Arc<dyn TenantDirectory> {
        &self.directory
    }

    /// Raw workspace identifier: the `x-workspace-slug` header wins over the
    /// host's subdomain. Not yet validated.
    pub fn extract_identifier(&self, headers: &HeaderMap) -> Option<String> {
        let from_header = headers
            .get(WORKSPACE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());
        if from_header.is_some() {
            return from_header;
        }

        let host = headers.get(header::HOST).and_then(|v| v.to_str().ok())?;
        self.subdomain_of(host)
    }

    fn subdomain_of(&self, host: &str) -> Option<String> {
        let host = strip_port(host.trim()).to_ascii_lowercase();
        if host.parse::<IpAddr>().is_ok() {
            return None;
        }

        let label = match &self.base_domain {
            Some(base) => {
                let prefix = host.strip_suffix(base.as_str())?.strip_suffix('.')?;
                if prefix.is_empty() || prefix.contains('.') {
                    return None;
                }
                prefix.to_string()
            }
            None => {
                let labels: Vec<&str> = host.split('.').collect();
                if labels.len() < 3 {
                    return None;
                }
                labels[0].to_string()
            }
        };

        if label.is_empty() || RESERVED_SUBDOMAINS.contains(&label.as_str()) {
            return None;
        }
        Some(label)
    }

    /// Load a tenant by validated slug, going through the TTL cache.
    pub async fn lookup(&self, slug: &TenantSlug) -> Result<Option<TenantContext>, InternalError> {
        if let Some(hit) = self.cache.get(slug.as_str()) {
            return Ok(Some(hit));
        }

        let Some(record) = self.directory.find_by_slug(slug).await? else {
            return Ok(None);
        };

        match TenantContext::from_record(&record) {
            Ok(context) => {
                self.cache.insert(context.clone());
                Ok(Some(context))
            }
            Err(e) => {
                // A stored slug outside the allow-list never yields a schema name.
                tracing::error!("Tenant {} has an invalid stored slug: {}", record.id, e);
                Ok(None)
            }
        }
    }

    /// Best-effort context for keying rate limits ahead of resolution.
    /// Any failure yields `None`.
    pub async fn peek(&self, headers: &HeaderMap) -> Option<TenantContext> {
        let slug = TenantSlug::parse(&self.extract_identifier(headers)?).ok()?;
        match self.lookup(&slug).await {
            Ok(context) => context,
            Err(e) => {
                tracing::debug!("Tenant peek for '{}' failed: {}", slug, e);
                None
            }
        }
    }

    /// Mark a tenant active again and drop its cached context.
    pub async fn reactivate(&self, context: &TenantContext) -> Result<bool, InternalError> {
        let changed = self.directory.set_active(context.tenant_id, true).await?;
        self.cache.invalidate(context.slug.as_str());
        if changed {
            tracing::info!("Reactivated workspace '{}'", context.slug);
        }
        Ok(changed)
    }

    /// Resolve the request's tenant according to the route's class.
    pub async fn resolve(
        &self,
        headers: &HeaderMap,
        class: RouteClass,
        allow_inactive: bool,
    ) -> Result<Option<TenantContext>, TenantError> {
        match class {
            RouteClass::Public => Ok(None),
            RouteClass::Required => self.resolve_required(headers, allow_inactive).await.map(Some),
            RouteClass::Optional => match self.resolve_required(headers, allow_inactive).await {
                Ok(context) => Ok(Some(context)),
                Err(TenantError::MissingTenant) => Ok(None),
                Err(e) => {
                    tracing::debug!("Optional tenant resolution skipped: {}", e);
                    Ok(None)
                }
            },
        }
    }

    async fn resolve_required(
        &self,
        headers: &HeaderMap,
        allow_inactive: bool,
    ) -> Result<TenantContext, TenantError> {
        let identifier = self.extract_identifier(headers).ok_or(TenantError::MissingTenant)?;
        let slug = TenantSlug::parse(&identifier)?;

        let context = self
            .lookup(&slug)
            .await?
            .ok_or_else(|| TenantError::TenantNotFound(slug.to_string()))?;

        if !context.is_active && !allow_inactive {
            tracing::warn!("Rejected request for inactive workspace '{}'", slug);
            return Err(TenantError::TenantInactive(slug.to_string()));
        }

        tracing::debug!("Resolved workspace '{}' ({})", context.slug, context.schema_name);
        Ok(context)
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal, possibly with a port
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Membership, Tenant};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct FakeDirectory {
        tenants: Vec<Tenant>,
        lookups: AtomicUsize,
        fail: bool,
    }

    impl FakeDirectory {
        fn with(tenants: Vec<Tenant>) -> Self {
            Self {
                tenants,
                lookups: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl TenantDirectory for FakeDirectory {
        async fn find_by_slug(&self, slug: &TenantSlug) -> Result<Option<Tenant>, InternalError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(InternalError::StoreUnavailable("down".into()));
            }
            Ok(self.tenants.iter().find(|t| t.slug == slug.as_str()).cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, InternalError> {
            Ok(self.tenants.iter().find(|t| t.id == id).cloned())
        }

        async fn find_membership(&self, _: Uuid, _: Uuid) -> Result<Option<Membership>, InternalError> {
            Ok(None)
        }

        async fn set_active(&self, id: Uuid, _: bool) -> Result<bool, InternalError> {
            Ok(self.tenants.iter().any(|t| t.id == id))
        }
    }

    fn tenant(slug: &str, active: bool) -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: slug.to_string(),
            is_active: active,
            plan: "free".to_string(),
            created_at: Utc::now(),
        }
    }

    fn resolver(dir: FakeDirectory, base: Option<&str>) -> TenantResolver {
        TenantResolver::new(Arc::new(dir), base.map(String::from), TenantCache::disabled())
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn header_wins_over_subdomain() {
        let r = resolver(FakeDirectory::with(vec![]), Some("example.com"));
        let h = headers(&[("x-workspace-slug", "  Acme-Corp "), ("host", "other.example.com")]);
        assert_eq!(r.extract_identifier(&h).as_deref(), Some("acme-corp"));
    }

    #[test]
    fn subdomain_parsing() {
        let r = resolver(FakeDirectory::with(vec![]), Some("example.com"));
        let id = |host: &str| r.extract_identifier(&headers(&[("host", host)]));
        assert_eq!(id("acme.example.com:8443").as_deref(), Some("acme"));
        assert_eq!(id("example.com"), None);
        assert_eq!(id("www.example.com"), None);
        assert_eq!(id("a.b.example.com"), None);
        assert_eq!(id("acme.other.org"), None);

        let heuristic = resolver(FakeDirectory::with(vec![]), None);
        let id = |host: &str| heuristic.extract_identifier(&headers(&[("host", host)]));
        assert_eq!(id("acme.example.com").as_deref(), Some("acme"));
        assert_eq!(id("localhost:3000"), None);
        assert_eq!(id("10.0.0.1:3000"), None);
    }

    #[tokio::test]
    async fn required_route_error_classes() {
        let r = resolver(
            FakeDirectory::with(vec![tenant("acme", true), tenant("dormant", false)]),
            None,
        );

        let err = r.resolve(&HeaderMap::new(), RouteClass::Required, false).await.unwrap_err();
        assert!(matches!(err, TenantError::MissingTenant));

        let err = r
            .resolve(&headers(&[("x-workspace-slug", "ghost")]), RouteClass::Required, false)
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::TenantNotFound(_)));

        let err = r
            .resolve(&headers(&[("x-workspace-slug", "dormant")]), RouteClass::Required, false)
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::TenantInactive(_)));

        let err = r
            .resolve(&headers(&[("x-workspace-slug", "a;drop")]), RouteClass::Required, false)
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::Validation(_)));

        let ctx = r
            .resolve(&headers(&[("x-workspace-slug", "dormant")]), RouteClass::Required, true)
            .await
            .unwrap()
            .unwrap();
        assert!(!ctx.is_active);
        assert_eq!(ctx.schema_name.as_str(), "tenant_dormant");
    }

    #[tokio::test]
    async fn optional_route_never_aborts() {
        let mut dir = FakeDirectory::with(vec![]);
        dir.fail = true;
        let r = resolver(dir, None);
        let out = r
            .resolve(&headers(&[("x-workspace-slug", "acme")]), RouteClass::Optional, false)
            .await
            .unwrap();
        assert!(out.is_none());
        assert!(r.resolve(&HeaderMap::new(), RouteClass::Optional, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn directory_failure_is_internal_on_required_routes() {
        let mut dir = FakeDirectory::with(vec![]);
        dir.fail = true;
        let r = resolver(dir, None);
        let err = r
            .resolve(&headers(&[("x-workspace-slug", "acme")]), RouteClass::Required, false)
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::Internal(_)));
    }

    #[tokio::test]
    async fn cache_absorbs_repeat_lookups() {
        let dir = Arc::new(FakeDirectory::with(vec![tenant("acme", true)]));
        let r = TenantResolver::new(dir.clone(), None, TenantCache::new(Duration::from_secs(30), 16));
        let h = headers(&[("x-workspace-slug", "acme")]);
        for _ in 0..3 {
            r.resolve(&h, RouteClass::Required, false).await.unwrap();
        }
        assert_eq!(dir.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn public_routes_skip_resolution() {
        let dir = Arc::new(FakeDirectory::with(vec![tenant("acme", true)]));
        let r = TenantResolver::new(dir.clone(), None, TenantCache::disabled());
        let out = r
            .resolve(&headers(&[("x-workspace-slug", "acme")]), RouteClass::Public, false)
            .await
            .unwrap();
        assert!(out.is_none());
        assert_eq!(dir.lookups.load(Ordering::SeqCst), 0);
    }
}
