pub mod embedding_cache;
pub mod embedding_service;
pub mod recommendation;
pub mod review_store;
pub mod similarity;

// Re-export public types
pub use embedding_cache::{CacheLayer, EmbeddingCache};
pub use embedding_service::EmbeddingService;
pub use recommendation::RecommendationService;
pub use review_store::ReviewStore;
