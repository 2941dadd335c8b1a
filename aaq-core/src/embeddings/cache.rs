//! Process-local LRU cache for embeddings.
//!
//! Keys are `sha256(model_name, text)` so a model change invalidates every
//! entry automatically. The cache is shared across requests and guarded by a
//! mutex; operations are a hash plus a map touch, so contention stays low.

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

use crate::constants::DEFAULT_EMBEDDING_CACHE_SIZE;

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

impl CacheMetrics {
    /// Hit rate in `[0, 1]`; 0.0 when the cache has not been used
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded LRU mapping `(model, text)` digests to embeddings
pub struct EmbeddingCache {
    entries: Mutex<LruCache<[u8; 32], Vec<f32>>>,
    metrics: Mutex<CacheMetrics>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` embeddings
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_EMBEDDING_CACHE_SIZE).unwrap());
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            metrics: Mutex::new(CacheMetrics::default()),
        }
    }

    /// Look up a cached embedding, promoting it on hit
    pub fn get(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let key = cache_key(model, text);
        let result = self.entries.lock().get(&key).cloned();
        let mut metrics = self.metrics.lock();
        match result {
            Some(_) => metrics.hits += 1,
            None => metrics.misses += 1,
        }
        result
    }

    /// Insert an embedding, evicting the least-recently-used entry when full
    pub fn put(&self, model: &str, text: &str, embedding: Vec<f32>) {
        self.entries.lock().put(cache_key(model, text), embedding);
    }

    /// Current counters
    pub fn metrics(&self) -> CacheMetrics {
        *self.metrics.lock()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(model: &str, text: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_and_miss_accounting() {
        let cache = EmbeddingCache::new(4);
        assert!(cache.get("m", "hello").is_none());
        cache.put("m", "hello", vec![1.0, 2.0]);
        assert_eq!(cache.get("m", "hello"), Some(vec![1.0, 2.0]));

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert!((metrics.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn model_name_partitions_the_cache() {
        let cache = EmbeddingCache::new(4);
        cache.put("model-a", "text", vec![1.0]);
        assert!(cache.get("model-b", "text").is_none());
        assert!(cache.get("model-a", "text").is_some());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2);
        cache.put("m", "a", vec![1.0]);
        cache.put("m", "b", vec![2.0]);
        // Touch "a" so "b" becomes the eviction candidate
        let _ = cache.get("m", "a");
        cache.put("m", "c", vec![3.0]);

        assert!(cache.get("m", "a").is_some());
        assert!(cache.get("m", "b").is_none());
        assert!(cache.get("m", "c").is_some());
    }
}
