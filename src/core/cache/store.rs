//! Cache store on top of Moka.
//!
//! Entries are kept in a bounded in-memory cache with an optional TTL. The
//! store is synchronous so cache checks can run inline when a job is
//! enqueued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache as MokaCache;
use serde::{Deserialize, Serialize};
use tracing::debug;
use xxhash_rust::xxh3::xxh3_128;

/// Cache configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached entries before least-recently-used eviction.
    pub max_entries: u64,
    /// Optional time-to-live for every entry, in seconds.
    pub ttl_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_seconds: None,
        }
    }
}

/// Hit, miss and insert counters for one store.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl CacheMetrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }
}

/// xxHash-based key hasher.
#[derive(Debug, Clone)]
pub struct XxHasher {
    prefix: String,
}

impl XxHasher {
    /// Creates a new hasher with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Hash `key` into a prefixed, fixed-width hex string.
    pub fn hash(&self, key: &str) -> String {
        let hash = xxh3_128(key.as_bytes());
        format!("{}:{:032x}", self.prefix, hash)
    }

    /// Hash a `(text, fingerprint)` pair into one key.
    ///
    /// The two parts are joined with a unit separator so that moving
    /// characters between them changes the key.
    pub fn hash_pair(&self, text: &str, fingerprint: &str) -> String {
        self.hash(&format!("{text}\u{1f}{fingerprint}"))
    }
}

/// Bounded, content-addressed cache.
pub struct CacheStore<V: Clone + Send + Sync + 'static> {
    cache: MokaCache<String, V>,
    metrics: CacheMetrics,
}

impl<V: Clone + Send + Sync + 'static> CacheStore<V> {
    pub fn new(config: &CacheConfig) -> Self {
        let mut builder = MokaCache::builder().max_capacity(config.max_entries);
        if let Some(ttl) = config.ttl_seconds {
            builder = builder.time_to_live(Duration::from_secs(ttl));
        }
        debug!(
            "Created cache store (max_entries={}, ttl={:?}s)",
            config.max_entries, config.ttl_seconds
        );
        Self {
            cache: builder.build(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        match self.cache.get(key) {
            Some(value) => {
                self.metrics.record_hit();
                Some(value)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        self.cache.insert(key.into(), value);
        self.metrics.record_insert();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    /// Number of live entries after pending maintenance has run.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}
