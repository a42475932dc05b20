use axum::http::Method;

use super::RateLimitPolicy;
use crate::config::RateLimitConfig;
use crate::tenant::Plan;

/// Which policy family a route belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateClass {
    /// Login and registration: tight window, long block.
    Auth,
    Standard,
}

/// Policy table: auth endpoints get one fixed policy, everything else is
/// chosen by method and plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicies {
    auth: RateLimitPolicy,
    standard_window_ms: u64,
    standard_block_ms: u64,
    read_max: u32,
    write_max: u32,
    pro_multiplier: u32,
    enterprise_multiplier: u32,
}

impl RatePolicies {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            auth: RateLimitPolicy::new(config.auth_window_ms, config.auth_max_requests, config.auth_block_ms),
            standard_window_ms: config.standard_window_ms,
            standard_block_ms: config.standard_block_ms,
            read_max: config.read_max_requests,
            write_max: config.write_max_requests,
            pro_multiplier: config.pro_multiplier,
            enterprise_multiplier: config.enterprise_multiplier,
        }
    }

    pub fn auth(&self) -> RateLimitPolicy {
        self.auth
    }

    pub fn select(&self, class: RateClass, method: &Method, plan: Plan) -> RateLimitPolicy {
        match class {
            RateClass::Auth => self.auth,
            RateClass::Standard => {
                let base = if is_read(method) { self.read_max } else { self.write_max };
                let multiplier = match plan {
                    Plan::Free => 1,
                    Plan::Pro => self.pro_multiplier,
                    Plan::Enterprise => self.enterprise_multiplier,
                };
                RateLimitPolicy::new(
                    self.standard_window_ms,
                    base.saturating_mul(multiplier.max(1)),
                    self.standard_block_ms,
                )
            }
        }
    }
}

impl Default for RatePolicies {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::standard())
    }
}

fn is_read(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
