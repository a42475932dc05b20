use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use super::{RateLimitCounter, RateLimitDecision, RateLimitPolicy, RateLimitStore};
use crate::error::InternalError;

/// In-process counters. Each key is updated under its shard lock, which
/// makes check-and-consume atomic per key.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    counters: DashMap<String, RateLimitCounter>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop counters whose window and block are both over.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_stale(now));
        before.saturating_sub(self.counters.len())
    }

    /// Periodically sweep on the runtime until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: StdDuration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                let removed = store.sweep(Utc::now());
                if removed > 0 {
                    tracing::debug!("Swept {} expired rate limit counters", removed);
                }
            }
        })
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn check_and_consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, InternalError> {
        let mut counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| RateLimitCounter::new(policy, now));
        Ok(counter.consume(policy, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn keys_are_counted_independently() {
        let store = MemoryRateLimitStore::new();
        let policy = RateLimitPolicy::new(60_000, 1, 60_000);
        let now = Utc::now();
        assert!(store.check_and_consume("a", &policy, now).await.unwrap().allowed);
        assert!(!store.check_and_consume("a", &policy, now).await.unwrap().allowed);
        assert!(store.check_and_consume("b", &policy, now).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn concurrent_bursts_cannot_exceed_the_ceiling() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let policy = RateLimitPolicy::new(60_000, 50, 60_000);
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..200 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.check_and_consume("burst", &policy, now).await.unwrap().allowed
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 50);
    }

    #[tokio::test]
    async fn sweep_keeps_blocked_keys() {
        let store = MemoryRateLimitStore::new();
        let policy = RateLimitPolicy::new(1_000, 1, 600_000);
        let now = Utc::now();
        store.check_and_consume("quiet", &policy, now).await.unwrap();
        store.check_and_consume("noisy", &policy, now).await.unwrap();
        store.check_and_consume("noisy", &policy, now).await.unwrap();

        assert_eq!(store.sweep(now + Duration::seconds(2)), 1);
        assert_eq!(store.len(), 1);
        assert!(!store.check_and_consume("noisy", &policy, now + Duration::seconds(2)).await.unwrap().allowed);
    }
}
