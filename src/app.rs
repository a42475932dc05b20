//! Shared state and the assembled request pipeline.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::auth::{JwtKeys, RefreshTokenStore, TokenAuthenticator, TokenLifecycleManager, UserDirectory};
use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::handlers::{protected, public};
use crate::middleware::{
    authenticate, cors_guard, instrument_request, rate_limit, resolve_tenant, sanitize_input, threat_guard,
    RouteCatalog,
};
use crate::security::{CorsPolicyGuard, RateLimitStore, RateLimiter, SuspiciousIpRegistry, ThreatDetector};
use crate::security::rate_limit::RatePolicies;
use crate::tenant::{TenantCache, TenantDirectory, TenantResolver};

/// Pipeline knobs read by the middleware stages.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub trust_proxy_headers: bool,
    pub block_suspicious_ips: bool,
    pub max_request_size_bytes: usize,
    pub slow_request_threshold: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            trust_proxy_headers: config.security.trust_proxy_headers,
            block_suspicious_ips: config.security.block_suspicious_ips,
            max_request_size_bytes: config.security.max_request_size_bytes,
            slow_request_threshold: Duration::from_millis(config.instrumentation.slow_request_threshold_ms),
        }
    }
}

/// Storage behind the pipeline. Production wires Postgres-backed
/// implementations; tests and single-node setups use the in-memory ones.
pub struct Backends {
    pub users: Arc<dyn UserDirectory>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub suspicious: Arc<dyn SuspiciousIpRegistry>,
    pub database: Option<DatabaseManager>,
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<PipelineSettings>,
    pub routes: Arc<RouteCatalog>,
    pub cors: Arc<CorsPolicyGuard>,
    pub rate_limiter: RateLimiter,
    pub threats: ThreatDetector,
    pub suspicious: Arc<dyn SuspiciousIpRegistry>,
    pub authenticator: TokenAuthenticator,
    pub tenants: Arc<TenantResolver>,
    pub database: Option<DatabaseManager>,
}

impl AppState {
    pub fn new(config: &AppConfig, backends: Backends) -> Self {
        let keys = Arc::new(JwtKeys::from_config(&config.security));
        let lifecycle = TokenLifecycleManager::new(keys.clone(), backends.refresh_tokens, backends.users);
        let cache = TenantCache::new(
            Duration::from_secs(config.tenant.cache_ttl_secs),
            config.tenant.cache_capacity,
        );

        Self {
            settings: Arc::new(PipelineSettings::from_config(config)),
            routes: Arc::new(RouteCatalog::standard()),
            cors: Arc::new(CorsPolicyGuard::new(&config.security.cors_origins)),
            rate_limiter: RateLimiter::new(
                backends.rate_limits,
                RatePolicies::from_config(&config.rate_limit),
                config.rate_limit.enabled,
            ),
            threats: ThreatDetector::new(),
            suspicious: backends.suspicious,
            authenticator: TokenAuthenticator::new(keys, lifecycle),
            tenants: Arc::new(TenantResolver::new(backends.tenants, config.tenant.base_domain.clone(), cache)),
            database: backends.database,
        }
    }

    pub fn lifecycle(&self) -> &TokenLifecycleManager {
        self.authenticator.lifecycle()
    }

    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        self.lifecycle().users()
    }
}

/// The service's routes, without the pipeline.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Public
        .route("/health", get(public::health))
        .route("/auth/login", post(public::auth::login_post))
        .route("/auth/refresh", post(public::auth::refresh_post))
        // Protected
        .route("/auth/logout", post(protected::auth::logout_post))
        .route("/api/auth/whoami", get(protected::auth::whoami_get))
        .route("/api/workspace", get(protected::workspace::current_get))
        .route("/api/workspace/reactivate", post(protected::workspace::reactivate_post))
        .route("/api/workspace/probe", get(protected::workspace::probe_get))
}

pub fn router(state: AppState) -> Router {
    with_pipeline(routes(), state)
}

/// Wrap `routes` in the security pipeline. Layers run outermost first:
/// instrumentation, panic capture, CORS, rate limit, threat screening,
/// sanitizing, authentication, tenant resolution.
pub fn with_pipeline(routes: Router<AppState>, state: AppState) -> Router {
    let body_limit = state.settings.max_request_size_bytes;
    routes
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn_with_state(state.clone(), resolve_tenant))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(from_fn(sanitize_input))
        .layer(from_fn_with_state(state.clone(), threat_guard))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(from_fn_with_state(state.clone(), cors_guard))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(state.clone(), instrument_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!("Handler panicked: {}", detail);
    ApiError::internal().into_response()
}
