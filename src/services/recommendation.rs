use crate::{
    error::{ApiError, Result},
    models::{Recommendation, RecommendationMode},
    services::{
        embedding_service::EmbeddingService,
        review_store::ReviewStore,
        similarity::{distances_from_embeddings, indices_of_nearest_neighbors},
    },
};
use std::sync::Arc;
use tracing::{debug, info};

/// Ranked neighbours of a query among arbitrary strings.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestStrings {
    /// Every input index, nearest first.
    pub indices: Vec<usize>,
    /// Human-readable summaries of the first `k` neighbours, excluding the query itself.
    pub descriptions: Vec<String>,
}

/// Collapse whitespace runs (including newlines) to single spaces.
pub fn normalize_query(description: &str) -> String {
    description.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone)]
pub struct RecommendationService {
    embeddings: EmbeddingService,
    store: Arc<ReviewStore>,
}

impl RecommendationService {
    pub fn new(embeddings: EmbeddingService, store: Arc<ReviewStore>) -> Self {
        Self { embeddings, store }
    }

    pub fn store(&self) -> &ReviewStore {
        &self.store
    }

    pub async fn recommend(
        &self,
        description: &str,
        n_recs: usize,
        mode: RecommendationMode,
    ) -> Result<Vec<Recommendation>> {
        match mode {
            RecommendationMode::Fragrance => self.recommend_by_fragrance(description, n_recs).await,
            RecommendationMode::Review => self.recommend_by_review(description, n_recs).await,
        }
    }

    /// Rank `strings` by distance to `query`, embedding everything through the cache.
    pub async fn nearest_strings(
        &self,
        strings: &[String],
        query: &str,
        k_nearest_neighbors: usize,
    ) -> Result<NearestStrings> {
        let mut embeddings = Vec::with_capacity(strings.len());
        for string in strings {
            embeddings.push(self.embeddings.embedding(string, false).await?);
        }
        let query_embedding = self.embeddings.embedding(query, false).await?;

        let distances =
            distances_from_embeddings(&query_embedding, embeddings.iter().map(Vec::as_slice))?;
        let indices = indices_of_nearest_neighbors(&distances);

        let descriptions = indices
            .iter()
            .filter(|&&i| strings[i] != query)
            .take(k_nearest_neighbors)
            .enumerate()
            .map(|(rank, &i)| {
                format!(
                    "--- Recommendation #{rank} (nearest neighbor {rank} of {k}) ---\nString: {string}\nDistance: {distance:0.3}",
                    rank = rank + 1,
                    k = k_nearest_neighbors,
                    string = strings[i],
                    distance = distances[i]
                )
            })
            .collect();

        Ok(NearestStrings {
            indices,
            descriptions,
        })
    }

    /// Recommend the fragrances of the reviews closest to the description.
    /// A review identical to the description is never recommended.
    pub async fn recommend_by_review(
        &self,
        description: &str,
        n_recs: usize,
    ) -> Result<Vec<Recommendation>> {
        let query = self.prepare_query(description)?;
        if n_recs == 0 || self.store.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embeddings.embedding(&query, false).await?;
        let reviews = self.store.reviews();
        let distances = distances_from_embeddings(
            &query_embedding,
            reviews.iter().map(|r| r.embedding.as_slice()),
        )?;

        let recommendations: Vec<Recommendation> = indices_of_nearest_neighbors(&distances)
            .into_iter()
            .filter(|&i| reviews[i].cleaned_review != query)
            .take(n_recs)
            .map(|i| {
                let review = &reviews[i];
                Recommendation::new(
                    &review.brand,
                    &review.name,
                    &review.cleaned_review,
                    distances[i],
                )
            })
            .collect();

        info!(
            "Review-based recommendations for '{}': {:?}",
            query,
            recommendations.iter().map(|r| &r.fragrance).collect::<Vec<_>>()
        );
        Ok(recommendations)
    }

    /// Recommend fragrances whose mean review embedding is closest to the
    /// description, each with its own review nearest to the description.
    pub async fn recommend_by_fragrance(
        &self,
        description: &str,
        n_recs: usize,
    ) -> Result<Vec<Recommendation>> {
        let query = self.prepare_query(description)?;
        if n_recs == 0 || self.store.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embeddings.embedding(&query, false).await?;
        let fragrances = self.store.fragrances();
        let distances = distances_from_embeddings(
            &query_embedding,
            fragrances.iter().map(|f| f.embedding.as_slice()),
        )?;

        let mut recommendations = Vec::with_capacity(n_recs.min(fragrances.len()));
        for i in indices_of_nearest_neighbors(&distances).into_iter().take(n_recs) {
            let fragrance = &fragrances[i];
            let reviews: Vec<_> = self.store.reviews_for(fragrance).collect();
            let review_distances = distances_from_embeddings(
                &query_embedding,
                reviews.iter().map(|r| r.embedding.as_slice()),
            )?;

            let relevant = indices_of_nearest_neighbors(&review_distances)
                .first()
                .map(|&j| reviews[j].cleaned_review.as_str())
                .unwrap_or_default();
            debug!(
                "{}: {} at distance {:.3}",
                fragrance.brand, fragrance.name, distances[i]
            );

            recommendations.push(Recommendation::new(
                &fragrance.brand,
                &fragrance.name,
                relevant,
                distances[i],
            ));
        }

        info!(
            "Fragrance-based recommendations for '{}': {:?}",
            query,
            recommendations.iter().map(|r| &r.fragrance).collect::<Vec<_>>()
        );
        Ok(recommendations)
    }

    fn prepare_query(&self, description: &str) -> Result<String> {
        let query = normalize_query(description);
        if query.is_empty() {
            return Err(ApiError::InvalidInput(
                "Fragrance description cannot be empty".to_string(),
            ));
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ml::embedder::testing::StubEmbedder, services::embedding_cache::EmbeddingCache,
        services::review_store::review,
    };
    use uuid::Uuid;

    fn service(embedder: StubEmbedder, store: ReviewStore) -> RecommendationService {
        let dir = std::env::temp_dir().join(format!("recommendation-{}", Uuid::new_v4()));
        let cache = EmbeddingCache::open(dir.join("q.json"), dir.join("t.json")).unwrap();
        let embeddings = EmbeddingService::new(Arc::new(embedder), Arc::new(cache), "babbage");
        RecommendationService::new(embeddings, Arc::new(store))
    }

    fn store() -> ReviewStore {
        ReviewStore::from_reviews(vec![
            review("Dior", "Sauvage", "fresh citrus", vec![1.0, 0.0, 0.0]),
            review("Dior", "Sauvage", "smoky amber", vec![0.0, 0.0, 1.0]),
            review("Chanel", "No 5", "powdery rose", vec![0.0, 1.0, 0.0]),
            review("Chanel", "No 5", "soft rose", vec![0.1, 0.9, 0.0]),
            review("Guerlain", "Vetiver", "green and smoky", vec![0.2, 0.0, 0.8]),
        ])
        .unwrap()
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  woody \n\t and   warm "), "woody and warm");
        assert_eq!(normalize_query(" \n "), "");
    }

    #[tokio::test]
    async fn test_recommend_by_fragrance() {
        let embedder = StubEmbedder::new(3).with("something smoky", vec![0.0, 0.0, 1.0]);
        let service = service(embedder, store());

        let recs = service
            .recommend_by_fragrance("  something \n smoky ", 2)
            .await
            .unwrap();

        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].fragrance, "Guerlain: Vetiver");
        assert_eq!(recs[0].relevant_review, "green and smoky");
        assert_eq!(recs[1].fragrance, "Dior: Sauvage");
        assert_eq!(recs[1].relevant_review, "smoky amber");
        assert!(recs[0].distance <= recs[1].distance);
    }

    #[tokio::test]
    async fn test_recommend_by_review() {
        let embedder = StubEmbedder::new(3).with("rose", vec![0.0, 1.0, 0.0]);
        let service = service(embedder, store());

        let recs = service.recommend_by_review("rose", 3).await.unwrap();
        let reviews: Vec<_> = recs.iter().map(|r| r.relevant_review.as_str()).collect();
        assert_eq!(reviews, vec!["powdery rose", "soft rose", "fresh citrus"]);
        assert_eq!(recs[0].fragrance, "Chanel: No 5");
    }

    #[tokio::test]
    async fn test_review_identical_to_query_is_skipped() {
        let embedder = StubEmbedder::new(3).with("powdery rose", vec![0.0, 1.0, 0.0]);
        let service = service(embedder, store());

        let recs = service.recommend_by_review("powdery rose", 1).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].relevant_review, "soft rose");
    }

    #[tokio::test]
    async fn test_edge_cases() {
        let service = service(StubEmbedder::new(3), store());

        assert!(matches!(
            service.recommend_by_fragrance("   ", 5).await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(service.recommend_by_fragrance("rose", 0).await.unwrap().is_empty());

        // Asking for more than exists returns everything
        let recs = service
            .recommend("rose", 10, RecommendationMode::Fragrance)
            .await
            .unwrap();
        assert_eq!(recs.len(), 3);
        let recs = service
            .recommend("rose", 10, RecommendationMode::Review)
            .await
            .unwrap();
        assert_eq!(recs.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let service = service(
            StubEmbedder::new(3),
            ReviewStore::from_reviews(vec![]).unwrap(),
        );
        assert!(service.recommend_by_review("rose", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nearest_strings() {
        let embedder = StubEmbedder::new(2)
            .with("citrus", vec![1.0, 0.0])
            .with("lemon", vec![0.9, 0.1])
            .with("musk", vec![0.0, 1.0]);
        let service = service(embedder, store());

        let strings = vec!["musk".to_string(), "citrus".to_string(), "lemon".to_string()];
        let nearest = service.nearest_strings(&strings, "citrus", 1).await.unwrap();

        assert_eq!(nearest.indices, vec![1, 2, 0]);
        assert_eq!(nearest.descriptions.len(), 1);
        assert!(nearest.descriptions[0]
            .starts_with("--- Recommendation #1 (nearest neighbor 1 of 1) ---"));
        assert!(nearest.descriptions[0].contains("String: lemon"));
    }
}
