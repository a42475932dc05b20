use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
    pub tenant: TenantConfig,
    pub instrumentation: InstrumentationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub connection_timeout: u64,
    /// Upper bound on any single store or directory round trip.
    pub io_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateLimitBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub backend: RateLimitBackend,
    pub auth_window_ms: u64,
    pub auth_max_requests: u32,
    pub auth_block_ms: u64,
    pub standard_window_ms: u64,
    pub standard_block_ms: u64,
    pub read_max_requests: u32,
    pub write_max_requests: u32,
    pub pro_multiplier: u32,
    pub enterprise_multiplier: u32,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub refresh_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_days: i64,
    pub cors_origins: Vec<String>,
    pub max_request_size_bytes: usize,
    pub block_suspicious_ips: bool,
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Apex domain used to read the workspace slug from a subdomain,
    /// e.g. `example.com` turns `acme.example.com` into `acme`.
    pub base_domain: Option<String>,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    pub slow_request_threshold_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_IO_TIMEOUT_MS") {
            self.database.io_timeout_ms = v.parse().unwrap_or(self.database.io_timeout_ms);
        }

        // Rate limit overrides
        if let Ok(v) = env::var("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = v.parse().unwrap_or(self.rate_limit.enabled);
        }
        if let Ok(v) = env::var("RATE_LIMIT_BACKEND") {
            match v.trim().to_ascii_lowercase().as_str() {
                "memory" => self.rate_limit.backend = RateLimitBackend::Memory,
                "postgres" | "pg" => self.rate_limit.backend = RateLimitBackend::Postgres,
                other => tracing::warn!("Ignoring unknown RATE_LIMIT_BACKEND '{}'", other),
            }
        }
        if let Ok(v) = env::var("RATE_LIMIT_AUTH_MAX_REQUESTS") {
            self.rate_limit.auth_max_requests = v.parse().unwrap_or(self.rate_limit.auth_max_requests);
        }
        if let Ok(v) = env::var("RATE_LIMIT_AUTH_WINDOW_MS") {
            self.rate_limit.auth_window_ms = v.parse().unwrap_or(self.rate_limit.auth_window_ms);
        }
        if let Ok(v) = env::var("RATE_LIMIT_AUTH_BLOCK_MS") {
            self.rate_limit.auth_block_ms = v.parse().unwrap_or(self.rate_limit.auth_block_ms);
        }
        if let Ok(v) = env::var("RATE_LIMIT_READ_MAX_REQUESTS") {
            self.rate_limit.read_max_requests = v.parse().unwrap_or(self.rate_limit.read_max_requests);
        }
        if let Ok(v) = env::var("RATE_LIMIT_WRITE_MAX_REQUESTS") {
            self.rate_limit.write_max_requests = v.parse().unwrap_or(self.rate_limit.write_max_requests);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_REFRESH_SECRET") {
            self.security.refresh_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_ACCESS_TOKEN_TTL_SECS") {
            self.security.access_token_ttl_secs = v.parse().unwrap_or(self.security.access_token_ttl_secs);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_TOKEN_TTL_DAYS") {
            self.security.refresh_token_ttl_days = v.parse().unwrap_or(self.security.refresh_token_ttl_days);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = env::var("SECURITY_MAX_REQUEST_SIZE_BYTES") {
            self.security.max_request_size_bytes = v.parse().unwrap_or(self.security.max_request_size_bytes);
        }
        if let Ok(v) = env::var("SECURITY_BLOCK_SUSPICIOUS_IPS") {
            self.security.block_suspicious_ips = v.parse().unwrap_or(self.security.block_suspicious_ips);
        }
        if let Ok(v) = env::var("SECURITY_TRUST_PROXY_HEADERS") {
            self.security.trust_proxy_headers = v.parse().unwrap_or(self.security.trust_proxy_headers);
        }

        // Tenant overrides
        if let Ok(v) = env::var("TENANT_BASE_DOMAIN") {
            let v = v.trim().to_ascii_lowercase();
            self.tenant.base_domain = if v.is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = env::var("TENANT_CACHE_TTL_SECS") {
            self.tenant.cache_ttl_secs = v.parse().unwrap_or(self.tenant.cache_ttl_secs);
        }
        if let Ok(v) = env::var("TENANT_CACHE_CAPACITY") {
            self.tenant.cache_capacity = v.parse().unwrap_or(self.tenant.cache_capacity);
        }

        if let Ok(v) = env::var("SLOW_REQUEST_THRESHOLD_MS") {
            self.instrumentation.slow_request_threshold_ms =
                v.parse().unwrap_or(self.instrumentation.slow_request_threshold_ms);
        }

        self
    }

    /// Reject settings the pipeline cannot run safely with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if self.security.refresh_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_REFRESH_SECRET"));
        }
        if self.security.jwt_secret == self.security.refresh_secret
            && self.environment == Environment::Production
        {
            return Err(ConfigError::Invalid(
                "access and refresh tokens must be signed with different secrets".to_string(),
            ));
        }
        if self.security.access_token_ttl_secs <= 0 || self.security.refresh_token_ttl_days <= 0 {
            return Err(ConfigError::Invalid("token lifetimes must be positive".to_string()));
        }
        let rl = &self.rate_limit;
        if rl.auth_max_requests == 0 || rl.read_max_requests == 0 || rl.write_max_requests == 0 {
            return Err(ConfigError::Invalid("rate limit ceilings must be at least 1".to_string()));
        }
        if rl.auth_window_ms == 0 || rl.standard_window_ms == 0 {
            return Err(ConfigError::Invalid("rate limit windows must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                io_timeout_ms: 5_000,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                backend: RateLimitBackend::Memory,
                ..RateLimitConfig::standard()
            },
            security: SecurityConfig {
                jwt_secret: "dev-access-secret-change-me".to_string(),
                refresh_secret: "dev-refresh-secret-change-me".to_string(),
                access_token_ttl_secs: 10 * 60,
                refresh_token_ttl_days: 7,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                block_suspicious_ips: false,
                trust_proxy_headers: true,
            },
            tenant: TenantConfig {
                base_domain: None,
                cache_ttl_secs: 0,
                cache_capacity: 256,
            },
            instrumentation: InstrumentationConfig {
                slow_request_threshold_ms: 5_000,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                io_timeout_ms: 3_000,
            },
            rate_limit: RateLimitConfig {
                backend: RateLimitBackend::Postgres,
                ..RateLimitConfig::standard()
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                refresh_secret: String::new(),
                access_token_ttl_secs: 10 * 60,
                refresh_token_ttl_days: 7,
                cors_origins: vec!["https://staging.example.com".to_string()],
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                block_suspicious_ips: false,
                trust_proxy_headers: true,
            },
            tenant: TenantConfig {
                base_domain: None,
                cache_ttl_secs: 15,
                cache_capacity: 1_024,
            },
            instrumentation: InstrumentationConfig {
                slow_request_threshold_ms: 5_000,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                io_timeout_ms: 3_000,
            },
            rate_limit: RateLimitConfig {
                backend: RateLimitBackend::Postgres,
                ..RateLimitConfig::standard()
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                refresh_secret: String::new(),
                access_token_ttl_secs: 10 * 60,
                refresh_token_ttl_days: 7,
                cors_origins: vec!["https://app.example.com".to_string()],
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
                block_suspicious_ips: true,
                trust_proxy_headers: true,
            },
            tenant: TenantConfig {
                base_domain: None,
                cache_ttl_secs: 30,
                cache_capacity: 4_096,
            },
            instrumentation: InstrumentationConfig {
                slow_request_threshold_ms: 5_000,
            },
        }
    }
}

impl RateLimitConfig {
    /// Login/register: 5 attempts per 15 minutes, then a one hour block.
    /// Everything else counts per minute.
    pub fn standard() -> Self {
        Self {
            enabled: true,
            backend: RateLimitBackend::Memory,
            auth_window_ms: 15 * 60 * 1_000,
            auth_max_requests: 5,
            auth_block_ms: 60 * 60 * 1_000,
            standard_window_ms: 60 * 1_000,
            standard_block_ms: 60 * 1_000,
            read_max_requests: 300,
            write_max_requests: 100,
            pro_multiplier: 5,
            enterprise_multiplier: 20,
            sweep_interval_secs: 60,
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
