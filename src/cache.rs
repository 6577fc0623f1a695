use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Instant;

use lru::LruCache;

use crate::model::{ShiftTemplate, TemplateQuery};
use crate::observability;

pub const DEFAULT_CAPACITY: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    tenant: String,
    fingerprint: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    templates: Vec<ShiftTemplate>,
    #[allow(dead_code)]
    inserted_at: Instant,
    last_accessed_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Hit percentage over all lookups; 0.0 before the first lookup.
    pub hit_rate: f64,
}

struct CacheInner {
    entries: LruCache<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded template store keyed by (tenant, query shape). One mutex guards
/// both the LRU chain and the counters, so a whole `get`/`set` is atomic
/// with respect to concurrent callers. A miss is a normal outcome — no
/// operation here can fail.
pub struct TemplateCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TemplateCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(NonZeroUsize::new(capacity).expect("capacity >= 1")),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity,
        }
    }

    /// Canonical JSON of the query shape; identical queries always map to
    /// the same key.
    fn key(tenant: &str, query: &TemplateQuery) -> CacheKey {
        CacheKey {
            tenant: tenant.to_string(),
            fingerprint: serde_json::to_string(query).expect("query shape serializes"),
        }
    }

    /// Cached templates for this tenant + query shape. A hit refreshes the
    /// entry's recency; a miss returns None — the cache never fabricates
    /// data.
    pub fn get(&self, tenant: &str, query: &TemplateQuery) -> Option<Vec<ShiftTemplate>> {
        let key = Self::key(tenant, query);
        let mut inner = self.inner.lock().expect("template cache poisoned");
        match inner.entries.get_mut(&key) {
            Some(entry) => {
                entry.last_accessed_at = Instant::now();
                let templates = entry.templates.clone();
                inner.hits += 1;
                metrics::counter!(observability::CACHE_HITS_TOTAL).increment(1);
                Some(templates)
            }
            None => {
                inner.misses += 1;
                metrics::counter!(observability::CACHE_MISSES_TOTAL).increment(1);
                None
            }
        }
    }

    /// Insert or overwrite. Inserting a new key at capacity evicts exactly
    /// one entry — the least recently used; overwriting refreshes recency
    /// without evicting.
    pub fn set(&self, tenant: &str, query: &TemplateQuery, templates: Vec<ShiftTemplate>) {
        let key = Self::key(tenant, query);
        let now = Instant::now();
        let entry = CacheEntry {
            templates,
            inserted_at: now,
            last_accessed_at: now,
        };
        let mut inner = self.inner.lock().expect("template cache poisoned");
        if let Some((evicted_key, _)) = inner.entries.push(key.clone(), entry)
            && evicted_key != key
        {
            inner.evictions += 1;
            metrics::counter!(observability::CACHE_EVICTIONS_TOTAL).increment(1);
        }
    }

    /// Drop every entry and reset all counters. Idempotent.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().expect("template cache poisoned");
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("template cache poisoned");
        let lookups = inner.hits + inner.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            inner.hits as f64 / lookups as f64 * 100.0
        };
        CacheStats {
            size: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeRange;
    use ulid::Ulid;

    fn template(name: &str) -> ShiftTemplate {
        ShiftTemplate {
            id: Ulid::new(),
            tenant_id: "acme".into(),
            name: name.into(),
            range: TimeRange::new(540, 1020),
            department: None,
        }
    }

    fn query(dept: &str) -> TemplateQuery {
        TemplateQuery {
            department: Some(dept.into()),
            location: None,
            include_inactive: false,
        }
    }

    #[test]
    fn miss_then_hit() {
        let cache = TemplateCache::new(10);
        let q = query("kitchen");
        assert!(cache.get("acme", &q).is_none());
        cache.set("acme", &q, vec![template("morning")]);
        let got = cache.get("acme", &q).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "morning");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[test]
    fn tenants_are_isolated() {
        let cache = TemplateCache::new(10);
        let q = query("kitchen");
        cache.set("acme", &q, vec![template("a")]);
        assert!(cache.get("globex", &q).is_none());
        assert!(cache.get("acme", &q).is_some());
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let cache = TemplateCache::new(3);
        for i in 0..20 {
            cache.set("acme", &query(&format!("dept{i}")), vec![]);
            assert!(cache.stats().size <= 3);
        }
    }

    #[test]
    fn lru_entry_is_the_one_evicted() {
        let cache = TemplateCache::new(2);
        let qa = query("a");
        let qb = query("b");
        cache.set("acme", &qa, vec![template("a")]);
        cache.set("acme", &qb, vec![template("b")]);
        // Touch "a" so "b" is now least recently used.
        assert!(cache.get("acme", &qa).is_some());
        cache.set("acme", &query("c"), vec![template("c")]);

        assert!(cache.get("acme", &qa).is_some());
        assert!(cache.get("acme", &qb).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache = TemplateCache::new(2);
        let q = query("a");
        cache.set("acme", &q, vec![template("v1")]);
        cache.set("acme", &query("b"), vec![]);
        // Cache is full; overwriting an existing key must not evict.
        cache.set("acme", &q, vec![template("v2")]);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.stats().size, 2);
        assert_eq!(cache.get("acme", &q).unwrap()[0].name, "v2");
    }

    #[test]
    fn overwrite_refreshes_recency() {
        let cache = TemplateCache::new(2);
        let qa = query("a");
        cache.set("acme", &qa, vec![]);
        cache.set("acme", &query("b"), vec![]);
        // Overwrite "a" — "b" becomes LRU and gets evicted next.
        cache.set("acme", &qa, vec![]);
        cache.set("acme", &query("c"), vec![]);
        assert!(cache.get("acme", &qa).is_some());
        assert!(cache.get("acme", &query("b")).is_none());
    }

    #[test]
    fn fill_to_capacity_then_one_more() {
        let cache = TemplateCache::new(2_000);
        for i in 0..2_000 {
            cache.set("acme", &query(&format!("d{i}")), vec![]);
        }
        assert_eq!(cache.stats().size, 2_000);
        assert_eq!(cache.stats().evictions, 0);

        cache.set("acme", &query("one_more"), vec![]);
        let stats = cache.stats();
        assert!(stats.size <= 2_000);
        assert!(stats.evictions >= 1);
    }

    #[test]
    fn clear_all_resets_counters() {
        let cache = TemplateCache::new(5);
        cache.set("acme", &query("a"), vec![]);
        cache.get("acme", &query("a"));
        cache.get("acme", &query("missing"));
        cache.clear_all();

        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.hit_rate, 0.0);

        // Idempotent.
        cache.clear_all();
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn hit_rate_zero_without_lookups() {
        let cache = TemplateCache::new(5);
        cache.set("acme", &query("a"), vec![]);
        assert_eq!(cache.stats().hit_rate, 0.0);
    }

    #[test]
    fn concurrent_access_is_consistent() {
        use std::sync::Arc;
        let cache = Arc::new(TemplateCache::new(64));
        let mut handles = Vec::new();
        for t in 0..8 {
            let c = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let q = query(&format!("d{}", (t * 100 + i) % 80));
                    c.set("acme", &q, vec![]);
                    c.get("acme", &q);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let stats = cache.stats();
        assert!(stats.size <= 64);
        assert_eq!(stats.hits + stats.misses, 800);
    }
}
