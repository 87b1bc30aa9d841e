pub mod parse;
pub mod storage;

use crate::{
    config::Config,
    error::{ApiError, Result},
    models::FragranceInfo,
};
use futures::{stream, StreamExt};
use log::{debug, info, warn};
use reqwest::Client;
use std::{collections::HashSet, time::Duration};
use url::Url;

const USER_AGENT: &str = concat!("recommend-a-fragrance/", env!("CARGO_PKG_VERSION"));

/// Fetches and parses fragrance pages from the review site.
#[derive(Debug, Clone)]
pub struct Scraper {
    client: Client,
    base_url: Url,
    frags_per_brand: usize,
    concurrency: usize,
}

/// Fragrances scraped for one brand, and the pages that failed.
#[derive(Debug, Default)]
pub struct BrandScrape {
    pub fragrances: Vec<FragranceInfo>,
    pub processed_urls: Vec<String>,
    pub failed_urls: Vec<String>,
}

impl Scraper {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.scrape_base_url()?,
            frags_per_brand: config.frags_per_brand,
            concurrency: config.scrape_concurrency.max(1),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::ScrapeError(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::ScrapeError(format!(
                "{} returned status {}",
                url, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ApiError::ScrapeError(format!("Failed to read {}: {}", url, e)))
    }

    /// Listing urls for the most popular brands.
    pub async fn brand_urls(&self) -> Result<Vec<String>> {
        let listing_url = self.base_url.join("/fragrances/").map_err(|e| {
            ApiError::ScrapeError(format!("Invalid listing url for {}: {}", self.base_url, e))
        })?;
        let listing = self.fetch(listing_url.as_str()).await?;
        let urls = parse::brand_urls(&listing, &self.base_url);
        info!("Found {} popular brands", urls.len());
        Ok(urls)
    }

    pub async fn brand_fragrance_urls(&self, brand_url: &str) -> Result<Vec<String>> {
        let page = self.fetch(brand_url).await?;
        Ok(parse::fragrance_urls(&page, &self.base_url, self.frags_per_brand))
    }

    /// Notes, name and brand from the fragrance page plus every review from its review page.
    pub async fn fragrance_info(&self, fragrance_url: &str) -> Result<FragranceInfo> {
        info!("Starting {}", fragrance_url);
        let page = self.fetch(fragrance_url).await?;
        let parsed = parse::parse_fragrance_page(&page)?;

        let review_page = self
            .fetch(&format!("{}/reviews", fragrance_url.trim_end_matches('/')))
            .await?;
        let reviews = parse::parse_reviews(&review_page);

        info!("Done with {} ({} reviews)", fragrance_url, reviews.len());
        Ok(FragranceInfo {
            brand: parsed.brand,
            name: parsed.name,
            notes: parsed.notes,
            reviews,
        })
    }

    /// Scrape every fragrance of a brand not yet in `processed`. Pages are
    /// fetched concurrently; a failing page is logged and skipped.
    pub async fn scrape_brand(
        &self,
        brand_url: &str,
        processed: &HashSet<String>,
    ) -> Result<BrandScrape> {
        let urls: Vec<String> = self
            .brand_fragrance_urls(brand_url)
            .await?
            .into_iter()
            .filter(|url| !processed.contains(url))
            .collect();
        debug!("{} new fragrances for {}", urls.len(), brand_url);

        let results: Vec<(String, Result<FragranceInfo>)> = stream::iter(urls)
            .map(|url| async move {
                let info = self.fragrance_info(&url).await;
                (url, info)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut scrape = BrandScrape::default();
        for (url, result) in results {
            match result {
                Ok(info) => {
                    scrape.fragrances.push(info);
                    scrape.processed_urls.push(url);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", url, e);
                    scrape.failed_urls.push(url);
                }
            }
        }

        Ok(scrape)
    }
}
