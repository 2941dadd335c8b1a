//! Text → vector conversion with caching, concurrency limiting and failure
//! isolation.
//!
//! [`EmbeddingService`] wraps any [`EmbeddingProvider`] with:
//! - an LRU cache keyed by `(model, text)` digest,
//! - a global semaphore bounding in-flight remote calls,
//! - a circuit breaker that fails fast while the endpoint is down,
//! - a startup dimension check that prevents writes on mismatch.

pub mod cache;
pub mod circuit_breaker;
pub mod http;
pub mod provider;
pub mod similarity;

pub use cache::{CacheMetrics, EmbeddingCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use http::HttpEmbeddingProvider;
pub use provider::EmbeddingProvider;
pub use similarity::{cosine_distance, cosine_similarity, rank_by_similarity};

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// Cached, bounded, breaker-guarded embedding front end
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    semaphore: Semaphore,
    breaker: CircuitBreaker,
    dimension: usize,
}

impl EmbeddingService {
    /// Wrap a provider with a cache of `cache_size` entries and at most
    /// `max_concurrency` in-flight remote calls
    #[must_use]
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache_size: usize,
        max_concurrency: usize,
    ) -> Self {
        let dimension = provider.embedding_dimension();
        Self {
            provider,
            cache: EmbeddingCache::new(cache_size),
            semaphore: Semaphore::new(max_concurrency.max(1)),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            dimension,
        }
    }

    /// Embed a single text, consulting the cache first
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.provider.model_name();
        if let Some(cached) = self.cache.get(model, text) {
            return Ok(cached);
        }

        self.breaker.allow_request()?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::Internal("embedding semaphore closed".to_string()))?;

        match self.provider.embed_text(text).await {
            Ok(embedding) => {
                self.breaker.record_success();
                provider::utils::validate_dimension(&embedding, self.dimension)?;
                self.cache
                    .put(self.provider.model_name(), text, embedding.clone());
                Ok(embedding)
            }
            Err(e) => {
                if e.is_recoverable() {
                    self.breaker.record_failure();
                }
                Err(e)
            }
        }
    }

    /// Verify the remote model produces vectors of the configured dimension.
    ///
    /// Run once at startup; a mismatch is fatal and must prevent the service
    /// from accepting writes.
    pub async fn verify_dimension(&self) -> Result<()> {
        let probe = self.embed("dimension probe").await?;
        provider::utils::validate_dimension(&probe, self.dimension)?;
        tracing::info!(
            model = self.provider.model_name(),
            dimension = self.dimension,
            "embedding dimension verified"
        );
        Ok(())
    }

    /// The configured vector dimension
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Model identifier of the wrapped provider
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Cache counters
    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        dimension: usize,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::UpstreamUnavailable("down".to_string()));
            }
            let mut v = vec![0.0; self.dimension];
            v[0] = text.len() as f32;
            Ok(v)
        }

        fn embedding_dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "counting-model"
        }
    }

    fn service(fail: bool, dimension: usize) -> (Arc<CountingProvider>, EmbeddingService) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            dimension,
            fail,
        });
        let service = EmbeddingService::new(provider.clone(), 16, 4);
        (provider, service)
    }

    #[tokio::test]
    async fn repeated_embeds_hit_the_cache() {
        let (provider, service) = service(false, 8);
        let first = service.embed("hello").await.unwrap();
        let second = service.embed("hello").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.cache_metrics().hits, 1);
    }

    #[tokio::test]
    async fn repeated_failures_open_the_breaker() {
        let (provider, service) = service(true, 8);
        for _ in 0..5 {
            let _ = service.embed("x").await;
        }
        let result = service.embed("x").await;
        assert!(matches!(result, Err(Error::CircuitBreakerOpen)));
        // The breaker rejected before reaching the provider
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_verification() {
        struct WrongDim;

        #[async_trait]
        impl EmbeddingProvider for WrongDim {
            async fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
                Ok(vec![0.0; 3])
            }
            fn embedding_dimension(&self) -> usize {
                4
            }
            fn model_name(&self) -> &str {
                "wrong-dim"
            }
        }

        let service = EmbeddingService::new(Arc::new(WrongDim), 16, 4);
        assert!(service.verify_dimension().await.is_err());
    }
}
