use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tenant_gate::config::{self, RateLimitBackend};
use tenant_gate::database::{
    DatabaseManager, PgRateLimitStore, PgRefreshTokenStore, PgTenantDirectory, PgUserDirectory,
};
use tenant_gate::security::rate_limit::MemoryRateLimitStore;
use tenant_gate::security::{MemorySuspiciousIps, RateLimitStore};
use tenant_gate::{router, AppState, Backends};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::config();
    config.validate().context("invalid configuration")?;
    tracing::info!("Starting tenant gate in {:?} mode", config.environment);

    let db = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    db.ensure_security_tables()
        .await
        .context("failed to create security tables")?;

    let sweep_every = Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1));
    let rate_limits: Arc<dyn RateLimitStore> = match config.rate_limit.backend {
        RateLimitBackend::Memory => {
            let store = Arc::new(MemoryRateLimitStore::new());
            store.spawn_sweeper(sweep_every);
            store as Arc<dyn RateLimitStore>
        }
        RateLimitBackend::Postgres => {
            let store = PgRateLimitStore::new(&db);
            spawn_counter_purge(store.clone(), sweep_every);
            Arc::new(store)
        }
    };
    tracing::info!("Rate limiting: {:?} backend, enabled={}", config.rate_limit.backend, config.rate_limit.enabled);

    let backends = Backends {
        users: Arc::new(PgUserDirectory::new(&db)),
        tenants: Arc::new(PgTenantDirectory::new(&db)),
        refresh_tokens: Arc::new(PgRefreshTokenStore::new(&db)),
        rate_limits,
        suspicious: Arc::new(MemorySuspiciousIps::new()),
        database: Some(db.clone()),
    };
    let app = router(AppState::new(config, backends));

    // Allow tests or deployments to override port via env
    let port = std::env::var("GATE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db.close().await;
    Ok(())
}

fn spawn_counter_purge(store: PgRateLimitStore, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_stale(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!("Purged {} stale rate limit counters", removed),
                Err(e) => tracing::warn!("Rate limit counter purge failed: {}", e),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
