mod common;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, Method, StatusCode},
};
use tenant_gate::auth::Identity;

use common::*;

struct Caller {
    token: String,
}

impl Caller {
    fn new(app: &TestApp) -> Result<Self> {
        let user = app.users.add("ada@example.com", "correct-horse");
        Ok(Self {
            token: app.access_token(&Identity::user(user.id))?,
        })
    }

    fn send_to(&self, method: Method, uri: &str, workspace: Option<&str>) -> Result<axum::http::Request<Body>> {
        let mut builder = request(method, uri).header(header::AUTHORIZATION, format!("Bearer {}", self.token));
        if let Some(slug) = workspace {
            builder = builder.header("x-workspace-slug", slug);
        }
        Ok(builder.body(Body::empty())?)
    }
}

#[tokio::test]
async fn workspace_route_requires_an_identifier() -> Result<()> {
    let app = TestApp::new();
    let caller = Caller::new(&app)?;

    let (response, body) = split_json(app.send(caller.send_to(Method::GET, "/api/workspace", None)?).await?).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "MISSING_TENANT");
    assert_eq!(body["path"], "/api/workspace");
    Ok(())
}

#[tokio::test]
async fn header_resolves_active_workspace() -> Result<()> {
    let app = TestApp::new();
    let caller = Caller::new(&app)?;
    let tenant = app.tenants.add("acme-corp", true, "pro");

    let (response, body) =
        split_json(app.send(caller.send_to(Method::GET, "/api/workspace", Some("Acme-Corp"))?).await?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["data"]["tenantId"], tenant.id.to_string());
    assert_eq!(body["data"]["slug"], "acme-corp");
    assert_eq!(body["data"]["schemaName"], "tenant_acme_corp");
    assert_eq!(body["data"]["plan"], "pro");
    Ok(())
}

#[tokio::test]
async fn subdomain_resolves_workspace() -> Result<()> {
    let app = TestApp::new();
    let caller = Caller::new(&app)?;
    app.tenants.add("globex", true, "free");

    let request = request(Method::GET, "/api/workspace")
        .header(header::AUTHORIZATION, format!("Bearer {}", caller.token))
        .header(header::HOST, "globex.gate.example.com:8443")
        .body(Body::empty())?;
    let (response, body) = split_json(app.send(request).await?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["data"]["slug"], "globex");
    Ok(())
}

#[tokio::test]
async fn malformed_and_unknown_slugs_are_distinguished() -> Result<()> {
    let app = TestApp::new();
    let caller = Caller::new(&app)?;

    let (response, body) =
        split_json(app.send(caller.send_to(Method::GET, "/api/workspace", Some("acme_corp"))?).await?).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "MALFORMED_SLUG");

    let (response, body) =
        split_json(app.send(caller.send_to(Method::GET, "/api/workspace", Some("nowhere"))?).await?).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body["errorCode"], "TENANT_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn inactive_workspace_is_refused_except_for_reactivation() -> Result<()> {
    let app = TestApp::new();
    let caller = Caller::new(&app)?;
    let tenant = app.tenants.add("dormant", false, "free");

    let (response, body) =
        split_json(app.send(caller.send_to(Method::GET, "/api/workspace", Some("dormant"))?).await?).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body["errorCode"], "TENANT_INACTIVE");

    let (response, body) = split_json(
        app.send(caller.send_to(Method::POST, "/api/workspace/reactivate", Some("dormant"))?)
            .await?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["data"]["slug"], "dormant");
    assert_eq!(body["data"]["reactivated"], true);
    assert!(app.tenants.is_active(tenant.id));

    let response = app.send(caller.send_to(Method::GET, "/api/workspace", Some("dormant"))?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Already active: nothing changes
    let (_, body) = split_json(
        app.send(caller.send_to(Method::POST, "/api/workspace/reactivate", Some("dormant"))?)
            .await?,
    )
    .await?;
    assert_eq!(body["data"]["reactivated"], false);
    Ok(())
}

#[tokio::test]
async fn optional_routes_ignore_bad_workspaces() -> Result<()> {
    let app = TestApp::new();
    let caller = Caller::new(&app)?;
    app.tenants.add("dormant", false, "free");
    app.tenants.add("acme-corp", true, "free");

    for slug in [None, Some("nowhere"), Some("dormant"), Some("x")] {
        let (response, body) =
            split_json(app.send(caller.send_to(Method::GET, "/api/auth/whoami", slug)?).await?).await?;
        assert_eq!(response.status(), StatusCode::OK, "slug {:?}", slug);
        assert!(body["data"]["workspace"].is_null(), "slug {:?}", slug);
    }

    let (_, body) =
        split_json(app.send(caller.send_to(Method::GET, "/api/auth/whoami", Some("acme-corp"))?).await?).await?;
    assert_eq!(body["data"]["workspace"]["slug"], "acme-corp");
    Ok(())
}

#[tokio::test]
async fn public_routes_skip_resolution() -> Result<()> {
    let app = TestApp::new();
    let request = request(Method::GET, "/health").header("x-workspace-slug", "Not A Slug!").body(Body::empty())?;

    let response = app.send(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn workspace_login_scopes_the_token() -> Result<()> {
    let app = TestApp::new();
    let user = app.users.add("ada@example.com", "correct-horse");
    let tenant = app.tenants.add("acme-corp", true, "free");
    let membership = app.tenants.add_member(&tenant, &user, "admin");
    app.tenants.add("other-co", true, "free");

    let login = serde_json::json!({
        "email": "ada@example.com",
        "password": "correct-horse",
        "workspace": "acme-corp",
    });
    let (response, body) = split_json(app.send(post_json("/auth/login", &login)).await?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["data"]["workspace"]["slug"], "acme-corp");

    let access = body["data"]["accessToken"].as_str().unwrap();
    let claims = app.state.lifecycle().keys().verify_access(access)?;
    assert_eq!(claims.tenant_id, Some(tenant.id));
    assert_eq!(claims.member_id, Some(membership.member_id));
    assert_eq!(claims.role.as_deref(), Some("admin"));

    let not_member = serde_json::json!({
        "email": "ada@example.com",
        "password": "correct-horse",
        "workspace": "other-co",
    });
    let response = app.send(post_json("/auth/login", &not_member)).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn paid_plans_get_higher_ceilings() -> Result<()> {
    let app = TestApp::new();
    let caller = Caller::new(&app)?;
    app.tenants.add("free-co", true, "free");
    app.tenants.add("big-co", true, "enterprise");

    let free = app.send(caller.send_to(Method::GET, "/api/workspace", Some("free-co"))?).await?;
    let enterprise = app.send(caller.send_to(Method::GET, "/api/workspace", Some("big-co"))?).await?;

    let limit = |r: &axum::http::Response<Body>| -> u32 {
        header(r, "x-ratelimit-limit").and_then(|v| v.parse().ok()).unwrap_or(0)
    };
    assert!(limit(&free) > 0);
    assert!(limit(&enterprise) > limit(&free));
    Ok(())
}

#[tokio::test]
async fn workspaces_have_separate_rate_budgets() -> Result<()> {
    let app = TestApp::with_config(|c| c.rate_limit.read_max_requests = 3);
    let caller = Caller::new(&app)?;
    app.tenants.add("acme-corp", true, "free");
    app.tenants.add("globex", true, "free");

    for _ in 0..3 {
        let response = app.send(caller.send_to(Method::GET, "/api/workspace", Some("acme-corp"))?).await?;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let (response, body) =
        split_json(app.send(caller.send_to(Method::GET, "/api/workspace", Some("acme-corp"))?).await?).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["errorCode"], "RATE_LIMIT_EXCEEDED");

    // Same address and caller, other workspace: untouched budget.
    let response = app.send(caller.send_to(Method::GET, "/api/workspace", Some("globex"))?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit"), Some("3"));
    assert_eq!(header(&response, "x-ratelimit-remaining"), Some("2"));
    Ok(())
}
