use crate::error::{ApiError, Result};
use config::{Environment, File};
use serde::Deserialize;
use std::{env, path::PathBuf};
use url::Url;

const CONFIG_FILE_NAME: &str = "recommend-a-fragrance";

pub const DEFAULT_ENGINE: &str = "text-similarity-babbage-001";

const MAX_RETRY_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,

    // Embeddings endpoint
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub embedding_engine: String,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,

    // Scraper output
    pub review_data_path: PathBuf,
    pub note_data_path: PathBuf,
    pub processed_urls_path: PathBuf,
    pub scrape_base_url: String,
    pub frags_per_brand: usize,
    pub scrape_concurrency: usize,

    // Embeddings, recommendation and app
    pub clean_review_path: PathBuf,
    pub embedding_train_cache_path: PathBuf,
    pub embedding_query_cache_path: PathBuf,
    pub final_reviews_path: PathBuf,
    pub sampled_reviews_path: PathBuf,
    /// Subsample the cleaned reviews when building embeddings.
    pub testing: bool,
    pub sample_rate: f64,
    pub seed: u64,
    pub default_recommendations: usize,
}

impl Config {
    /// Load configuration from defaults, an optional `recommend-a-fragrance.{toml,json,yaml}`
    /// file and `APP_*` environment variables, in that order of precedence.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8080)?
            .set_default("openai_base_url", "https://api.openai.com/v1")?
            .set_default("embedding_engine", DEFAULT_ENGINE)?
            .set_default("request_timeout_secs", 30)?
            .set_default("retry_attempts", 3)?
            .set_default("retry_delay_ms", 500)?
            .set_default("review_data_path", "reviews.csv")?
            .set_default("note_data_path", "frag_notes.csv")?
            .set_default("processed_urls_path", "processed_urls.txt")?
            .set_default("scrape_base_url", "https://basenotes.com")?
            .set_default("frags_per_brand", 40)?
            .set_default("scrape_concurrency", 8)?
            .set_default("clean_review_path", "reviews_cleaned.csv")?
            .set_default("embedding_train_cache_path", "embeddings.json")?
            .set_default("embedding_query_cache_path", "embeddings_query.json")?
            .set_default("final_reviews_path", "reviews_final.csv")?
            .set_default("sampled_reviews_path", "sampled_reviews.csv")?
            .set_default("testing", false)?
            .set_default("sample_rate", 0.03)?
            .set_default("seed", 40)?
            .set_default("default_recommendations", 5)?
            .add_source(File::with_name(CONFIG_FILE_NAME).required(false))
            .add_source(Environment::with_prefix("APP"))
            .build()?;

        let mut config: Config = settings.try_deserialize()?;

        if config.openai_api_key.as_deref().map_or(true, str::is_empty) {
            config.openai_api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ApiError::ConfigError("port must be non-zero".to_string()));
        }
        if !(self.sample_rate > 0.0 && self.sample_rate <= 1.0) {
            return Err(ApiError::ConfigError(format!(
                "sample_rate must be in (0, 1], got {}",
                self.sample_rate
            )));
        }
        if self.retry_attempts == 0 || self.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ApiError::ConfigError(format!(
                "retry_attempts must be between 1 and {}, got {}",
                MAX_RETRY_ATTEMPTS, self.retry_attempts
            )));
        }
        self.scrape_base_url()?;
        if self.scrape_concurrency == 0 {
            return Err(ApiError::ConfigError(
                "scrape_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scrape_base_url(&self) -> Result<Url> {
        Url::parse(&self.scrape_base_url).map_err(|e| {
            ApiError::ConfigError(format!(
                "scrape_base_url '{}' is not a valid url: {}",
                self.scrape_base_url, e
            ))
        })
    }

    /// Reviews joined with their embeddings. Testing runs write a separate sampled file.
    pub fn reviews_and_embeddings_path(&self) -> PathBuf {
        if self.testing {
            self.sampled_reviews_path.clone()
        } else {
            self.final_reviews_path.clone()
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(dir: &std::path::Path) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            openai_api_key: None,
            openai_base_url: "http://localhost:0".to_string(),
            embedding_engine: DEFAULT_ENGINE.to_string(),
            request_timeout_secs: 1,
            retry_attempts: 1,
            retry_delay_ms: 1,
            review_data_path: dir.join("reviews.csv"),
            note_data_path: dir.join("frag_notes.csv"),
            processed_urls_path: dir.join("processed_urls.txt"),
            scrape_base_url: "https://basenotes.com".to_string(),
            frags_per_brand: 40,
            scrape_concurrency: 2,
            clean_review_path: dir.join("reviews_cleaned.csv"),
            embedding_train_cache_path: dir.join("embeddings.json"),
            embedding_query_cache_path: dir.join("embeddings_query.json"),
            final_reviews_path: dir.join("reviews_final.csv"),
            sampled_reviews_path: dir.join("sampled_reviews.csv"),
            testing: false,
            sample_rate: 0.03,
            seed: 40,
            default_recommendations: 5,
        }
    }
}
