use serde::{Deserialize, Serialize};

// Re-export types from fragrance.rs
pub use fragrance::{
    CleanReview, EmbeddedReview, FragNote, FragranceInfo, NoteRecord, ReviewRecord,
};

mod fragrance;

/// How recommendations are ranked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationMode {
    /// Rank fragrances by the mean embedding of their reviews, then pick the
    /// closest review of each as the relevant one.
    #[default]
    Fragrance,
    /// Rank individual reviews and return their fragrances.
    Review,
}

/// Request structure for fragrance recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    /// Free-text description of the wanted fragrance
    pub query: String,
    /// Number of recommendations to return (default: 5)
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub mode: RecommendationMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// "Brand: Name"
    pub fragrance: String,
    pub brand: String,
    pub name: String,
    pub relevant_review: String,
    /// Cosine distance between the query and whatever was ranked
    pub distance: f32,
}

impl Recommendation {
    pub fn new(brand: &str, name: &str, relevant_review: &str, distance: f32) -> Self {
        Self {
            fragrance: format!("{}: {}", brand, name),
            brand: brand.to_string(),
            name: name.to_string(),
            relevant_review: relevant_review.to_string(),
            distance,
        }
    }
}

/// Response structure for fragrance recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub query: String,
    pub mode: RecommendationMode,
    pub recommendations: Vec<Recommendation>,
}

/// Health check response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Current timestamp in RFC3339 format
    pub timestamp: String,
    pub fragrances: usize,
    pub reviews: usize,
}

fn default_top_k() -> usize {
    5
}
