use super::Embedder;
use crate::embeddings::util::embed_cache_key;
use async_trait::async_trait;
use moka::sync::Cache;
use std::sync::Arc;

/// In-memory memo in front of another embedder, keyed by model and text hash.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, max_entries: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(max_entries),
        }
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let key = embed_cache_key(self.inner.model_id(), text);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(event = "cache_hit", key = %key, cache = "embedding");
            return Ok(hit.as_ref().clone());
        }
        tracing::debug!(event = "cache_miss", key = %key, cache = "embedding");

        let v = self.inner.embed(text).await?;
        self.cache.insert(key, Arc::new(v.clone()));
        Ok(v)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
