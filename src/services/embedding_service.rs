use crate::{
    error::Result,
    ml::Embedder,
    services::embedding_cache::{CacheLayer, EmbeddingCache},
};
use log::{debug, info};
use std::sync::Arc;

/// Memoized access to the embeddings endpoint.
#[derive(Clone)]
pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    engine: String,
}

impl EmbeddingService {
    pub fn new(embedder: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>, engine: &str) -> Self {
        Self {
            embedder,
            cache,
            engine: engine.to_string(),
        }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Embedding of `text` with the default engine.
    pub async fn embedding(&self, text: &str, training: bool) -> Result<Vec<f32>> {
        self.embedding_with_engine(text, &self.engine, training).await
    }

    /// Embedding of `text`, computed at most once per `(text, engine)`.
    /// Text should already have its newlines removed. Training embeddings and
    /// query embeddings are cached in separate layers.
    pub async fn embedding_with_engine(
        &self,
        text: &str,
        engine: &str,
        training: bool,
    ) -> Result<Vec<f32>> {
        if let Some(embedding) = self.cache.get(text, engine) {
            debug!("Embedding cache hit ({} chars)", text.len());
            return Ok(embedding);
        }

        info!("Embedding cache miss, requesting from {}", engine);
        let embedding = self.embedder.embed(text, engine).await?;

        let layer = if training {
            CacheLayer::Training
        } else {
            CacheLayer::Query
        };
        self.cache
            .insert(layer, text, engine, embedding.clone())
            .await?;

        Ok(embedding)
    }
}
