use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Position of a note in a fragrance's pyramid. Notes scraped without a
/// heading end up as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragNote {
    Top,
    Heart,
    Base,
    Unknown,
}

impl FragNote {
    /// Classify a heading such as "Top Notes" or "Heart notes" by its first word.
    pub fn from_heading(heading: &str) -> Self {
        match heading
            .split_whitespace()
            .next()
            .map(str::to_ascii_uppercase)
            .as_deref()
        {
            Some("TOP") => FragNote::Top,
            Some("HEART") => FragNote::Heart,
            Some("BASE") => FragNote::Base,
            _ => FragNote::Unknown,
        }
    }
}

/// Everything scraped for one fragrance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragranceInfo {
    pub brand: String,
    pub name: String,
    pub notes: BTreeMap<FragNote, Vec<String>>,
    pub reviews: Vec<String>,
}

impl FragranceInfo {
    pub fn review_records(&self) -> impl Iterator<Item = ReviewRecord> + '_ {
        self.reviews.iter().map(move |review| ReviewRecord {
            brand: self.brand.clone(),
            name: self.name.clone(),
            review: review.clone(),
        })
    }

    pub fn note_record(&self) -> NoteRecord {
        let column = |note: FragNote| {
            self.notes
                .get(&note)
                .map(|notes| serde_json::to_string(notes).unwrap_or_default())
                .unwrap_or_default()
        };

        NoteRecord {
            brand: self.brand.clone(),
            name: self.name.clone(),
            top: column(FragNote::Top),
            heart: column(FragNote::Heart),
            base: column(FragNote::Base),
            unknown: column(FragNote::Unknown),
        }
    }
}

/// Raw review row. The raw review file is appended to without a header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub brand: String,
    pub name: String,
    pub review: String,
}

/// Note row; each note column holds a JSON array, or is empty when the page had none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub brand: String,
    pub name: String,
    pub top: String,
    pub heart: String,
    pub base: String,
    pub unknown: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanReview {
    pub brand: String,
    pub name: String,
    pub review: String,
    pub cleaned_review: String,
}

impl From<ReviewRecord> for CleanReview {
    fn from(record: ReviewRecord) -> Self {
        let cleaned_review = record.review.replace('\n', " ");
        Self {
            brand: record.brand,
            name: record.name,
            review: record.review,
            cleaned_review,
        }
    }
}

/// A cleaned review joined with its embedding, one row of the final review file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedReview {
    pub brand: String,
    pub name: String,
    pub review: String,
    pub cleaned_review: String,
    #[serde(
        serialize_with = "serialize_embedding",
        deserialize_with = "deserialize_embedding"
    )]
    pub embedding: Vec<f32>,
}

impl EmbeddedReview {
    pub fn new(review: CleanReview, embedding: Vec<f32>) -> Self {
        Self {
            brand: review.brand,
            name: review.name,
            review: review.review,
            cleaned_review: review.cleaned_review,
            embedding,
        }
    }
}

// Embeddings are stored as a JSON array inside a single CSV cell.
fn serialize_embedding<S>(embedding: &[f32], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let encoded = serde_json::to_string(embedding).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&encoded)
}

fn deserialize_embedding<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    serde_json::from_str(&raw).map_err(serde::de::Error::custom)
}
