use crate::{
    error::{ApiError, Result},
    models::EmbeddedReview,
    services::similarity::mean_embedding,
};
use csv::ReaderBuilder;
use log::{info, warn};
use std::{collections::BTreeMap, fs::File, path::Path};

/// A fragrance and the mean embedding of its reviews.
#[derive(Debug, Clone, PartialEq)]
pub struct FragranceEmbedding {
    pub brand: String,
    pub name: String,
    pub embedding: Vec<f32>,
    review_indices: Vec<usize>,
}

/// In-memory reviews with their embeddings, grouped per fragrance.
#[derive(Debug, Default)]
pub struct ReviewStore {
    reviews: Vec<EmbeddedReview>,
    fragrances: Vec<FragranceEmbedding>,
    dimension: usize,
}

impl ReviewStore {
    /// Load the reviews-and-embeddings CSV produced by the embedding build.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading reviews and embeddings from {}", path.display());
        let file = File::open(path).map_err(|e| {
            ApiError::DataError(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let mut reader = ReaderBuilder::new()
            .flexible(false)
            .from_reader(file);

        let mut reviews = Vec::new();
        for (row, result) in reader.deserialize::<EmbeddedReview>().enumerate() {
            let review = result.map_err(|e| {
                ApiError::DataError(format!("Bad review row {} in {}: {}", row + 1, path.display(), e))
            })?;
            reviews.push(review);
        }

        Self::from_reviews(reviews)
    }

    pub fn from_reviews(reviews: Vec<EmbeddedReview>) -> Result<Self> {
        let dimension = reviews.first().map_or(0, |r| r.embedding.len());
        if let Some((row, review)) = reviews
            .iter()
            .enumerate()
            .find(|(_, r)| r.embedding.len() != dimension || r.embedding.is_empty())
        {
            return Err(ApiError::DataError(format!(
                "Review {} ({}: {}) has an embedding of dimension {}, expected {}",
                row + 1,
                review.brand,
                review.name,
                review.embedding.len(),
                dimension
            )));
        }

        // BTreeMap keeps fragrances ordered by (brand, name)
        let mut groups: BTreeMap<(&str, &str), Vec<usize>> = BTreeMap::new();
        for (i, review) in reviews.iter().enumerate() {
            groups
                .entry((review.brand.as_str(), review.name.as_str()))
                .or_default()
                .push(i);
        }

        let mut fragrances = Vec::with_capacity(groups.len());
        for ((brand, name), review_indices) in groups {
            let embedding = mean_embedding(
                review_indices
                    .iter()
                    .map(|&i| reviews[i].embedding.as_slice()),
            )?
            .unwrap_or_default();

            fragrances.push(FragranceEmbedding {
                brand: brand.to_string(),
                name: name.to_string(),
                embedding,
                review_indices,
            });
        }

        if reviews.is_empty() {
            warn!("Review store is empty; recommendations will be empty");
        } else {
            info!(
                "Loaded {} reviews of {} fragrances (dimension {})",
                reviews.len(),
                fragrances.len(),
                dimension
            );
        }

        Ok(Self {
            reviews,
            fragrances,
            dimension,
        })
    }

    pub fn reviews(&self) -> &[EmbeddedReview] {
        &self.reviews
    }

    pub fn fragrances(&self) -> &[FragranceEmbedding] {
        &self.fragrances
    }

    pub fn reviews_for<'a>(
        &'a self,
        fragrance: &'a FragranceEmbedding,
    ) -> impl Iterator<Item = &'a EmbeddedReview> + 'a {
        fragrance
            .review_indices
            .iter()
            .map(move |&i| &self.reviews[i])
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn review(brand: &str, name: &str, text: &str, embedding: Vec<f32>) -> EmbeddedReview {
    EmbeddedReview {
        brand: brand.to_string(),
        name: name.to_string(),
        review: text.to_string(),
        cleaned_review: text.to_string(),
        embedding,
    }
}
