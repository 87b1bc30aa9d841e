pub mod build_embeddings;
pub mod scrape;

pub use build_embeddings::build_embeddings;
pub use scrape::{clean_reviews, scrape_all, ScrapeSummary};
