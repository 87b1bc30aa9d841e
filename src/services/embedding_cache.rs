use crate::error::{ApiError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::RwLock,
};
use uuid::Uuid;

/// Embeddings are memoized per `(text, engine)`.
pub type CacheKey = (String, String);

type Layer = HashMap<CacheKey, Vec<f32>>;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    text: String,
    engine: String,
    embedding: Vec<f32>,
}

/// Which layer a new embedding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLayer {
    /// User queries, persisted after every insert.
    Query,
    /// Review embeddings, persisted only by [`EmbeddingCache::save_training`].
    Training,
}

/// Two-layer embedding memo. Lookups see the query layer first and fall back to
/// the training layer.
pub struct EmbeddingCache {
    query: RwLock<Layer>,
    training: RwLock<Layer>,
    query_path: PathBuf,
    training_path: PathBuf,
    // Serializes writers so the file on disk always holds the latest snapshot
    persist_lock: tokio::sync::Mutex<()>,
}

impl EmbeddingCache {
    /// Open both layers. Missing files start empty; unreadable ones are an error.
    pub fn open(query_path: impl Into<PathBuf>, training_path: impl Into<PathBuf>) -> Result<Self> {
        let query_path = query_path.into();
        let training_path = training_path.into();

        let query = load_layer(&query_path)?;
        let training = load_layer(&training_path)?;
        info!(
            "Loaded embedding cache: {} query entries, {} training entries",
            query.len(),
            training.len()
        );

        Ok(Self {
            query: RwLock::new(query),
            training: RwLock::new(training),
            query_path,
            training_path,
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn get(&self, text: &str, engine: &str) -> Option<Vec<f32>> {
        let key = (text.to_string(), engine.to_string());

        if let Some(embedding) = read_layer(&self.query).get(&key) {
            return Some(embedding.clone());
        }
        read_layer(&self.training).get(&key).cloned()
    }

    pub fn contains(&self, text: &str, engine: &str) -> bool {
        self.get(text, engine).is_some()
    }

    /// Insert into a layer. Query inserts are written through to disk.
    pub async fn insert(
        &self,
        layer: CacheLayer,
        text: &str,
        engine: &str,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let key = (text.to_string(), engine.to_string());

        match layer {
            CacheLayer::Query => {
                write_layer(&self.query).insert(key, embedding);
                self.save_query().await
            }
            CacheLayer::Training => {
                write_layer(&self.training).insert(key, embedding);
                Ok(())
            }
        }
    }

    pub async fn save_query(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let contents = encode_layer(&read_layer(&self.query))?;
        persist(&self.query_path, contents).await
    }

    pub async fn save_training(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let contents = encode_layer(&read_layer(&self.training))?;
        persist(&self.training_path, contents).await?;
        info!("Saved training embeddings to {}", self.training_path.display());
        Ok(())
    }

    pub fn len(&self, layer: CacheLayer) -> usize {
        match layer {
            CacheLayer::Query => read_layer(&self.query).len(),
            CacheLayer::Training => read_layer(&self.training).len(),
        }
    }
}

// A poisoned lock only means another thread panicked mid-insert; the map itself is still valid
fn read_layer(layer: &RwLock<Layer>) -> std::sync::RwLockReadGuard<'_, Layer> {
    layer.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_layer(layer: &RwLock<Layer>) -> std::sync::RwLockWriteGuard<'_, Layer> {
    layer.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn load_layer(path: &Path) -> Result<Layer> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No embedding cache at {}, starting empty", path.display());
            return Ok(Layer::new());
        }
        Err(e) => {
            return Err(ApiError::CacheError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let entries: Vec<CacheEntry> = serde_json::from_str(&contents).map_err(|e| {
        ApiError::CacheError(format!("Corrupt embedding cache {}: {}", path.display(), e))
    })?;

    Ok(entries
        .into_iter()
        .map(|entry| ((entry.text, entry.engine), entry.embedding))
        .collect())
}

fn encode_layer(layer: &Layer) -> Result<Vec<u8>> {
    let mut entries: Vec<CacheEntry> = layer
        .iter()
        .map(|((text, engine), embedding)| CacheEntry {
            text: text.clone(),
            engine: engine.clone(),
            embedding: embedding.clone(),
        })
        .collect();
    entries.sort_by(|a, b| (&a.text, &a.engine).cmp(&(&b.text, &b.engine)));

    Ok(serde_json::to_vec(&entries)?)
}

// Written to a sibling temp file, then renamed over `path`.
async fn persist(path: &Path, contents: Vec<u8>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
    tokio::fs::write(&tmp_path, contents).await.map_err(|e| {
        ApiError::CacheError(format!("Failed to write {}: {}", tmp_path.display(), e))
    })?;
    tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
        ApiError::CacheError(format!("Failed to replace {}: {}", path.display(), e))
    })?;
    Ok(())
}
