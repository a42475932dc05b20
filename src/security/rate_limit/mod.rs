//! Request rate limiting.
//!
//! A [`RateLimitStore`] owns the counters and must apply
//! [`RateLimitCounter::consume`] semantics in one atomic step per key. The
//! [`RateLimiter`] on top composes keys, picks policies and fails open when
//! the store is unavailable.

pub mod memory;
pub mod policy;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::InternalError;

pub use memory::MemoryRateLimitStore;
pub use policy::{RateClass, RatePolicies};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub window_ms: u64,
    pub max_requests: u32,
    pub block_duration_ms: u64,
}

impl RateLimitPolicy {
    pub fn new(window_ms: u64, max_requests: u32, block_duration_ms: u64) -> Self {
        Self {
            window_ms,
            max_requests,
            block_duration_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::milliseconds(self.window_ms as i64)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::milliseconds(self.block_duration_ms as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    pub fn exceeded(&self) -> Option<RateLimitExceeded> {
        if self.allowed {
            return None;
        }
        Some(RateLimitExceeded {
            retry_after_secs: self.retry_after_secs.unwrap_or(1),
        })
    }

    /// Build the outcome from a counter state after consumption.
    pub fn from_state(
        policy: &RateLimitPolicy,
        count: u32,
        window_reset_at: DateTime<Utc>,
        blocked_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        match blocked_until.filter(|until| *until > now) {
            Some(until) => Self {
                allowed: false,
                limit: policy.max_requests,
                remaining: 0,
                reset_at: until,
                retry_after_secs: Some(ceil_secs(until - now)),
            },
            None => Self {
                allowed: true,
                limit: policy.max_requests,
                remaining: policy.max_requests.saturating_sub(count),
                reset_at: window_reset_at,
                retry_after_secs: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded, retry after {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub retry_after_secs: u64,
}

fn ceil_secs(d: Duration) -> u64 {
    let ms = d.num_milliseconds().max(0) as u64;
    ms.div_ceil(1000).max(1)
}

/// Per-key counter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitCounter {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitCounter {
    pub fn new(policy: &RateLimitPolicy, now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_reset_at: now + policy.window(),
            blocked_until: None,
        }
    }

    /// Check the block, roll the window, count the request and escalate to
    /// a block when the ceiling is crossed. The block runs independently of
    /// the counting window.
    pub fn consume(&mut self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> RateLimitDecision {
        if let Some(until) = self.blocked_until {
            if until > now {
                return RateLimitDecision::from_state(policy, self.count, self.window_reset_at, Some(until), now);
            }
            self.blocked_until = None;
            self.reset_window(policy, now);
        }

        if self.window_reset_at <= now {
            self.reset_window(policy, now);
        }

        self.count = self.count.saturating_add(1);
        if self.count > policy.max_requests {
            self.blocked_until = Some(now + policy.block_duration());
        }

        RateLimitDecision::from_state(policy, self.count, self.window_reset_at, self.blocked_until, now)
    }

    fn reset_window(&mut self, policy: &RateLimitPolicy, now: DateTime<Utc>) {
        self.count = 0;
        self.window_reset_at = now + policy.window();
    }

    /// Nothing left to remember once both the window and any block are over.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.window_reset_at <= now && self.blocked_until.map_or(true, |until| until <= now)
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically check and count one request against `key`.
    async fn check_and_consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, InternalError>;
}

/// Counter identifier. Tenant-scoped keys keep one workspace's traffic from
/// spending another's budget.
pub fn rate_limit_key(tenant_id: Option<Uuid>, ip: &str, user_id: Option<Uuid>, endpoint: &str) -> String {
    let user = user_id.map_or_else(|| "anonymous".to_string(), |id| id.to_string());
    match tenant_id {
        Some(tenant) => format!("tenant:{}:{}:{}:{}", tenant, ip, user, endpoint),
        None => format!("global:{}:{}:{}", ip, user, endpoint),
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policies: RatePolicies,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policies: RatePolicies, enabled: bool) -> Self {
        Self {
            store,
            policies,
            enabled,
        }
    }

    pub fn policies(&self) -> &RatePolicies {
        &self.policies
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `None` when limiting is off or the store failed; a store failure
    /// lets the request through.
    pub async fn check(&self, key: &str, policy: &RateLimitPolicy) -> Option<RateLimitDecision> {
        if !self.enabled {
            return None;
        }
        match self.store.check_and_consume(key, policy, Utc::now()).await {
            Ok(decision) => {
                if !decision.allowed {
                    tracing::warn!("Rate limit exceeded for {}", key);
                }
                Some(decision)
            }
            Err(e) => {
                tracing::warn!("Rate limit store unavailable, allowing request: {}", e);
                None
            }
        }
    }
}
