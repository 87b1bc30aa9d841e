use crate::{
    config::Config,
    crawler::storage::ensure_parent,
    error::{ApiError, Result},
    models::{CleanReview, EmbeddedReview},
    services::embedding_service::EmbeddingService,
};
use csv::{ReaderBuilder, Writer};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use rand::{rngs::StdRng, seq::index, SeedableRng};
use std::{fs::File, path::Path};

/// Read the cleaned review file written by the scraper's cleanup step.
pub fn read_clean_reviews(path: &Path) -> Result<Vec<CleanReview>> {
    let file = File::open(path).map_err(|e| {
        ApiError::DataError(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let mut reader = ReaderBuilder::new().from_reader(file);

    let mut reviews = Vec::new();
    for result in reader.deserialize::<CleanReview>() {
        reviews.push(result?);
    }
    Ok(reviews)
}

/// Keep a seeded random fraction of the reviews, preserving their file order.
pub fn subsample<T>(rows: Vec<T>, fraction: f64, seed: u64) -> Vec<T> {
    let amount = ((rows.len() as f64) * fraction).round() as usize;
    let amount = amount.min(rows.len());

    let mut rng = StdRng::seed_from_u64(seed);
    let mut keep = index::sample(&mut rng, rows.len(), amount).into_vec();
    keep.sort_unstable();

    let mut keep = keep.into_iter().peekable();
    rows.into_iter()
        .enumerate()
        .filter_map(|(i, row)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(row)
            } else {
                None
            }
        })
        .collect()
}

/// Compute (or fetch from cache) the embedding of every cleaned review, save the
/// training cache and write the reviews-and-embeddings file.
pub async fn build_embeddings(config: &Config, embeddings: &EmbeddingService) -> Result<usize> {
    info!("Reading cleaned reviews from {}", config.clean_review_path.display());
    let mut reviews = read_clean_reviews(&config.clean_review_path)?;

    if config.testing {
        info!("Before: {} reviews", reviews.len());
        reviews = subsample(reviews, config.sample_rate, config.seed);
        info!("After: {} reviews", reviews.len());
    }

    let progress = ProgressBar::new(reviews.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} reviews ({eta})")
            .progress_chars("=> "),
    );

    let mut embedded = Vec::with_capacity(reviews.len());
    for review in reviews {
        match embeddings.embedding(&review.cleaned_review, true).await {
            Ok(embedding) => embedded.push(EmbeddedReview::new(review, embedding)),
            Err(e) => {
                progress.abandon();
                error!("Failed to embed review of {}: {}", review.name, e);
                // Keep what was computed so a rerun only pays for the rest
                embeddings.cache().save_training().await?;
                return Err(e);
            }
        }
        progress.inc(1);
    }
    progress.finish();

    embeddings.cache().save_training().await?;

    let output = config.reviews_and_embeddings_path();
    write_embedded_reviews(&output, &embedded)?;
    info!("Wrote {} embedded reviews to {}", embedded.len(), output.display());

    Ok(embedded.len())
}

fn write_embedded_reviews(path: &Path, reviews: &[EmbeddedReview]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = Writer::from_path(path)?;
    for review in reviews {
        writer.serialize(review)?;
    }
    writer.flush()?;
    Ok(())
}
