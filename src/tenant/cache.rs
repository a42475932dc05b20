use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::TenantContext;

struct Entry {
    context: TenantContext,
    inserted_at: Instant,
}

/// Bounded TTL cache of resolved tenants, keyed by slug.
///
/// Only positive lookups are cached. A zero TTL or capacity disables it.
pub struct TenantCache {
    ttl: Duration,
    capacity: usize,
    entries: DashMap<String, Entry>,
}

impl TenantCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: DashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    fn enabled(&self) -> bool {
        !self.ttl.is_zero() && self.capacity > 0
    }

    pub fn get(&self, slug: &str) -> Option<TenantContext> {
        if !self.enabled() {
            return None;
        }
        let hit = self
            .entries
            .get(slug)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.context.clone());
        if hit.is_none() {
            let ttl = self.ttl;
            self.entries.remove_if(slug, |_, entry| entry.inserted_at.elapsed() >= ttl);
        }
        hit
    }

    pub fn insert(&self, context: TenantContext) {
        if !self.enabled() {
            return;
        }
        let slug = context.slug.as_str().to_string();
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&slug) {
            let ttl = self.ttl;
            self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
            if self.entries.len() >= self.capacity {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|entry| entry.inserted_at)
                    .map(|entry| entry.key().clone());
                if let Some(key) = oldest {
                    self.entries.remove(&key);
                }
            }
        }
        self.entries.insert(
            slug,
            Entry {
                context,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, slug: &str) {
        self.entries.remove(slug);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{Plan, SchemaName, TenantSlug};
    use uuid::Uuid;

    fn ctx(slug: &str) -> TenantContext {
        let slug = TenantSlug::parse(slug).unwrap();
        TenantContext {
            tenant_id: Uuid::new_v4(),
            schema_name: SchemaName::for_slug(&slug),
            slug,
            is_active: true,
            plan: Plan::Free,
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let cache = TenantCache::new(Duration::from_secs(60), 2);
        cache.insert(ctx("one"));
        cache.insert(ctx("two"));
        cache.insert(ctx("three"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("one").is_none());
        assert!(cache.get("three").is_some());
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = TenantCache::new(Duration::from_millis(1), 8);
        cache.insert(ctx("acme"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("acme").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_readers_see_the_same_context() {
        let cache = std::sync::Arc::new(TenantCache::new(Duration::from_secs(60), 8));
        let inserted = ctx("acme");
        let id = inserted.tenant_id;
        cache.insert(inserted);

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.get("acme").map(|c| c.tenant_id))
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), Some(id));
        }
    }

    #[test]
    fn invalidation_drops_one_slug() {
        let cache = TenantCache::new(Duration::from_secs(60), 8);
        cache.insert(ctx("acme"));
        cache.insert(ctx("globex"));
        cache.invalidate("acme");
        assert!(cache.get("acme").is_none());
        assert!(cache.get("globex").is_some());
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = TenantCache::disabled();
        cache.insert(ctx("acme"));
        assert!(cache.is_empty());
    }
}
