#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use tenant_gate::app::{with_pipeline, AppState, Backends};
use tenant_gate::auth::{Identity, MemoryRefreshTokenStore, UserDirectory};
use tenant_gate::config::AppConfig;
use tenant_gate::database::models::{Membership, Tenant, User};
use tenant_gate::error::InternalError;
use tenant_gate::security::rate_limit::MemoryRateLimitStore;
use tenant_gate::security::MemorySuspiciousIps;
use tenant_gate::tenant::{TenantDirectory, TenantSlug};

pub const CLIENT_IP: &str = "203.0.113.7";
pub const USER_AGENT: &str = "integration-test/1.0";
pub const ORIGIN: &str = "https://app.example.com";

/// Users with plain-text passwords; hashing is the real directory's job.
#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<Vec<(User, String)>>,
}

impl MemoryUsers {
    pub fn add(&self, email: &str, password: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: Some(email.split('@').next().unwrap_or(email).to_string()),
            is_active: true,
            created_at: Utc::now(),
        };
        self.users.lock().unwrap().push((user.clone(), password.to_string()));
        user
    }

    pub fn deactivate(&self, id: Uuid) {
        for (user, _) in self.users.lock().unwrap().iter_mut() {
            if user.id == id {
                user.is_active = false;
            }
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<User>, InternalError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u.id == id && u.is_active)
            .map(|(u, _)| u.clone()))
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>, InternalError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|(u, p)| u.email.eq_ignore_ascii_case(email.trim()) && p == password && u.is_active)
            .map(|(u, _)| u.clone()))
    }
}

#[derive(Default)]
pub struct MemoryTenants {
    tenants: Mutex<Vec<Tenant>>,
    members: Mutex<Vec<Membership>>,
}

impl MemoryTenants {
    pub fn add(&self, slug: &str, is_active: bool, plan: &str) -> Tenant {
        let tenant = Tenant {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: slug.to_string(),
            is_active,
            plan: plan.to_string(),
            created_at: Utc::now(),
        };
        self.tenants.lock().unwrap().push(tenant.clone());
        tenant
    }

    pub fn add_member(&self, tenant: &Tenant, user: &User, role: &str) -> Membership {
        let membership = Membership {
            member_id: Uuid::new_v4(),
            tenant_id: tenant.id,
            user_id: user.id,
            role: role.to_string(),
        };
        self.members.lock().unwrap().push(membership.clone());
        membership
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.tenants.lock().unwrap().iter().any(|t| t.id == id && t.is_active)
    }
}

#[async_trait]
impl TenantDirectory for MemoryTenants {
    async fn find_by_slug(&self, slug: &TenantSlug) -> Result<Option<Tenant>, InternalError> {
        Ok(self.tenants.lock().unwrap().iter().find(|t| t.slug == slug.as_str()).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, InternalError> {
        Ok(self.tenants.lock().unwrap().iter().find(|t| t.id == id).cloned())
    }

    async fn find_membership(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, InternalError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.user_id == user_id)
            .cloned())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, InternalError> {
        let mut tenants = self.tenants.lock().unwrap();
        match tenants.iter_mut().find(|t| t.id == id) {
            Some(t) if t.is_active != active => {
                t.is_active = active;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// The full pipeline in-process, over in-memory collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<MemoryUsers>,
    pub tenants: Arc<MemoryTenants>,
    pub refresh_tokens: Arc<MemoryRefreshTokenStore>,
    pub suspicious: Arc<MemorySuspiciousIps>,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.security.cors_origins = vec![ORIGIN.to_string()];
    config.tenant.cache_ttl_secs = 0;
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(adjust, |state| with_pipeline(tenant_gate::app::routes(), state))
    }

    /// Extra routes (and the state they run with) mounted under the same
    /// pipeline.
    pub fn build(adjust: impl FnOnce(&mut AppConfig), mount: impl FnOnce(AppState) -> Router) -> Self {
        let mut config = test_config();
        adjust(&mut config);

        let users = Arc::new(MemoryUsers::default());
        let tenants = Arc::new(MemoryTenants::default());
        let refresh_tokens = Arc::new(MemoryRefreshTokenStore::new());
        let suspicious = Arc::new(MemorySuspiciousIps::new());

        let state = AppState::new(
            &config,
            Backends {
                users: users.clone(),
                tenants: tenants.clone(),
                refresh_tokens: refresh_tokens.clone(),
                rate_limits: Arc::new(MemoryRateLimitStore::new()),
                suspicious: suspicious.clone(),
                database: None,
            },
        );

        Self {
            router: mount(state.clone()),
            state,
            users,
            tenants,
            refresh_tokens,
            suspicious,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn login(&self, email: &str, password: &str, persistent: bool) -> Result<(Response<Body>, Value)> {
        let body = serde_json::json!({ "email": email, "password": password, "loginType": persistent });
        let response = self.send(post_json("/auth/login", &body)).await?;
        let (response, json) = split_json(response).await?;
        Ok((response, json))
    }

    /// An access token for `user_id` that expired an hour ago, correctly
    /// signed.
    pub fn expired_access_token(&self, user_id: Uuid) -> Result<String> {
        let keys = self.state.lifecycle().keys();
        let claims = keys.access_claims(&Identity::user(user_id), Utc::now() - Duration::hours(2));
        Ok(keys.encode_access(&claims)?)
    }

    pub fn access_token(&self, identity: &Identity) -> Result<String> {
        let keys = self.state.lifecycle().keys();
        Ok(keys.encode_access(&keys.access_claims(identity, Utc::now()))?)
    }
}

/// A request as a browser behind the proxy would send it.
pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP)
        .header(header::USER_AGENT, USER_AGENT)
        .header(header::ORIGIN, ORIGIN)
}

pub fn get(uri: &str) -> Request<Body> {
    request(Method::GET, uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    request(Method::POST, uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Keep the head (status and headers) and parse the body.
pub async fn split_json(response: Response<Body>) -> Result<(Response<Body>, Value)> {
    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await?;
    let json = serde_json::from_slice(&bytes)?;
    Ok((Response::from_parts(parts, Body::empty()), json))
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
