//! Caching layer for trialscreen-runtime.
//!
//! Provides in-memory caching of validated narratives so repeated
//! explanation requests with identical inputs do not call the model again.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::narrative::Narrative;
use crate::prompts::ExplanationRequest;

/// Cache key for explanation results.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    request_hash: u64,
    model: String,
}

impl CacheKey {
    /// Create a cache key from the request and the model that will answer it.
    ///
    /// Returns `None` if the request cannot be serialized for hashing.
    pub fn new(request: &ExplanationRequest, model: &str) -> Option<Self> {
        // Patient values include floats, so hash the canonical JSON form
        let json = serde_json::to_string(request).ok()?;
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);

        Some(Self {
            request_hash: hasher.finish(),
            model: model.to_string(),
        })
    }
}

/// Narrative cache using moka.
pub struct ExplanationCache {
    cache: Cache<CacheKey, Narrative>,
}

impl ExplanationCache {
    /// Create a new cache with the given configuration.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Get a cached narrative.
    pub async fn get(&self, key: &CacheKey) -> Option<Narrative> {
        self.cache.get(key).await
    }

    /// Store a narrative in the cache.
    pub async fn insert(&self, key: CacheKey, narrative: Narrative) {
        self.cache.insert(key, narrative).await;
    }

    /// Drop one entry.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.cache.invalidate(key).await;
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ExplanationCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(3600))
    }
}
