//! Cache-aware, batched embedding adapter.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::client::EmbeddingProvider;
use crate::cache::{cache_key, CacheStore};
use crate::error::{CacheError, EmbeddingError};
use crate::llm::structured::StatCounters;
use crate::llm::AdapterStats;

#[derive(Debug, Serialize)]
struct EmbeddingKey<'a> {
    kind: &'static str,
    model: &'a str,
    dimensions: usize,
    text: &'a str,
}

/// Embeds texts through a provider, one cache entry per text.
///
/// Texts already in the cache are served from it; all remaining texts go
/// to the provider in a single batched call.
pub struct CachedEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn CacheStore>,
    stats: StatCounters,
}

impl std::fmt::Debug for CachedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEmbedder")
            .field("model", &self.provider.model())
            .field("dimensions", &self.provider.dimensions())
            .finish_non_exhaustive()
    }
}

impl CachedEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            provider,
            cache,
            stats: StatCounters::default(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats.snapshot()
    }

    fn key_for(&self, text: &str) -> Result<String, CacheError> {
        cache_key(&EmbeddingKey {
            kind: "embedding",
            model: self.provider.model(),
            dimensions: self.provider.dimensions(),
            text,
        })
    }

    fn decode(&self, key: &str, value: Value) -> Result<Vec<f64>, CacheError> {
        let vector: Vec<f64> = serde_json::from_value(value).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            message: format!("not an embedding vector: {}", e),
        })?;
        if vector.len() != self.dimensions() {
            return Err(CacheError::Corrupt {
                key: key.to_string(),
                message: format!(
                    "embedding has {} dimensions, expected {}",
                    vector.len(),
                    self.dimensions()
                ),
            });
        }
        Ok(vector)
    }

    /// Returns one vector per text, in input order.
    ///
    /// # Errors
    ///
    /// Provider errors propagate. A provider reply with the wrong number of
    /// vectors or a vector of the wrong length is rejected before anything
    /// is cached.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        let mut results: Vec<Option<Vec<f64>>> = vec![None; texts.len()];
        let mut pending: Vec<(usize, String)> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = self.key_for(text)?;
            match self.cache.get(&key).await? {
                Some(value) => {
                    self.stats.hit();
                    results[i] = Some(self.decode(&key, value)?);
                }
                None => {
                    self.stats.miss();
                    pending.push((i, key));
                }
            }
        }

        if !pending.is_empty() {
            let batch: Vec<String> = pending.iter().map(|(i, _)| texts[*i].clone()).collect();
            tracing::info!(
                values = batch.len(),
                cached = texts.len() - batch.len(),
                model = self.provider.model(),
                "Embedding values"
            );

            let vectors = self.provider.embed(&batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }
            if let Some((pos, bad)) = vectors
                .iter()
                .enumerate()
                .find(|(_, v)| v.len() != self.dimensions())
            {
                return Err(EmbeddingError::DimensionMismatch {
                    text: batch[pos].clone(),
                    expected: self.dimensions(),
                    actual: bad.len(),
                });
            }

            for ((i, key), vector) in pending.into_iter().zip(vectors) {
                let value = serde_json::to_value(&vector).map_err(CacheError::from)?;
                self.cache.set(&key, &value).await?;
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Mock embedding provider: vector = [len, first byte, 1.0], batches recorded.
    struct MockEmbeddingProvider {
        batches: Mutex<Vec<Vec<String>>>,
        dimensions: usize,
        short_by: usize,
    }

    impl MockEmbeddingProvider {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                dimensions: 3,
                short_by: 0,
            }
        }

        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError> {
            self.batches.lock().unwrap().push(texts.to_vec());
            Ok(texts
                .iter()
                .skip(self.short_by)
                .map(|t| vec![t.len() as f64, t.as_bytes()[0] as f64, 1.0])
                .collect())
        }

        fn model(&self) -> &str {
            "mock-embed"
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_embed_batches_misses_once() {
        let provider = Arc::new(MockEmbeddingProvider::new());
        let embedder = CachedEmbedder::new(provider.clone(), Arc::new(MemoryCacheStore::new()));

        let vectors = embedder.embed(&texts(&["ab", "c", "def"])).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vec![2.0, 97.0, 1.0]);
        assert_eq!(vectors[2][0], 3.0);
        assert_eq!(provider.batches(), vec![texts(&["ab", "c", "def"])]);
    }

    #[tokio::test]
    async fn test_embed_only_uncached_values_sent() {
        let provider = Arc::new(MockEmbeddingProvider::new());
        let embedder = CachedEmbedder::new(provider.clone(), Arc::new(MemoryCacheStore::new()));

        embedder.embed(&texts(&["ab", "c"])).await.unwrap();
        let vectors = embedder.embed(&texts(&["c", "xyz", "ab"])).await.unwrap();

        assert_eq!(provider.batches()[1], texts(&["xyz"]));
        assert_eq!(vectors[0], vec![1.0, 99.0, 1.0]);
        assert_eq!(vectors[1], vec![3.0, 120.0, 1.0]);
        assert_eq!(vectors[2], vec![2.0, 97.0, 1.0]);
        assert_eq!(embedder.stats(), AdapterStats { hits: 3, misses: 3 });
    }

    #[tokio::test]
    async fn test_fully_cached_makes_no_call() {
        let provider = Arc::new(MockEmbeddingProvider::new());
        let embedder = CachedEmbedder::new(provider.clone(), Arc::new(MemoryCacheStore::new()));

        embedder.embed(&texts(&["ab"])).await.unwrap();
        embedder.embed(&texts(&["ab"])).await.unwrap();
        embedder.embed(&[]).await.unwrap();
        assert_eq!(provider.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_count_mismatch_rejected_and_not_cached() {
        let provider = Arc::new(MockEmbeddingProvider {
            short_by: 1,
            ..MockEmbeddingProvider::new()
        });
        let cache = Arc::new(MemoryCacheStore::new());
        let embedder = CachedEmbedder::new(provider, cache.clone());

        let err = embedder.embed(&texts(&["a", "b"])).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let provider = Arc::new(MockEmbeddingProvider {
            dimensions: 4,
            ..MockEmbeddingProvider::new()
        });
        let embedder = CachedEmbedder::new(provider, Arc::new(MemoryCacheStore::new()));

        let err = embedder.embed(&texts(&["a"])).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_corrupt_cached_vector_is_fatal() {
        let provider = Arc::new(MockEmbeddingProvider::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let embedder = CachedEmbedder::new(provider, cache.clone());

        let key = embedder.key_for("ab").unwrap();
        cache.set_raw(&key, "[1.0, 2.0");

        let err = embedder.embed(&texts(&["ab"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Cache(CacheError::Corrupt { .. })));
    }
}
