use crate::{
    config::Config,
    crawler::{storage, Scraper},
    error::Result,
};
use log::{error, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub brands: usize,
    pub fragrances: usize,
    pub reviews: usize,
    pub failed: usize,
}

/// Scrape every popular brand and append notes, reviews and processed urls.
/// Already processed fragrances are skipped, so this can be rerun after a failure.
pub async fn scrape_all(config: &Config) -> Result<ScrapeSummary> {
    let scraper = Scraper::new(config)?;
    let mut processed = storage::read_processed_urls(&config.processed_urls_path)?;
    info!("{} fragrances already processed", processed.len());

    let mut summary = ScrapeSummary::default();
    for brand_url in scraper.brand_urls().await? {
        let scrape = match scraper.scrape_brand(&brand_url, &processed).await {
            Ok(scrape) => scrape,
            Err(e) => {
                error!("Failed to scrape brand {}: {}", brand_url, e);
                summary.failed += 1;
                continue;
            }
        };

        storage::append_notes(&config.note_data_path, &scrape.fragrances)?;
        let reviews = storage::append_reviews(&config.review_data_path, &scrape.fragrances)?;
        storage::append_processed_urls(&config.processed_urls_path, &scrape.processed_urls)?;

        if !scrape.failed_urls.is_empty() {
            warn!(
                "{} fragrances of {} failed and will be retried next run",
                scrape.failed_urls.len(),
                brand_url
            );
        }

        summary.brands += 1;
        summary.fragrances += scrape.fragrances.len();
        summary.reviews += reviews;
        summary.failed += scrape.failed_urls.len();
        processed.extend(scrape.processed_urls);
    }

    info!(
        "Scraped {} brands: {} fragrances, {} reviews, {} failures",
        summary.brands, summary.fragrances, summary.reviews, summary.failed
    );
    Ok(summary)
}

/// Produce the cleaned review file from the raw scraped reviews.
pub fn clean_reviews(config: &Config) -> Result<usize> {
    let count = storage::cleanup_reviews(&config.review_data_path, &config.clean_review_path)?;
    info!(
        "Cleaned {} reviews into {}",
        count,
        config.clean_review_path.display()
    );
    Ok(count)
}
