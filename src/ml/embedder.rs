use crate::error::Result;
use async_trait::async_trait;

/// Anything that can turn a piece of text into an embedding vector for a given engine.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, engine: &str) -> Result<Vec<f32>>;
}
