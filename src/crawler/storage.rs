use crate::{
    error::Result,
    models::{CleanReview, FragranceInfo, ReviewRecord},
};
use csv::{ReaderBuilder, Writer, WriterBuilder};
use std::{
    collections::HashSet,
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::Path,
};

/// Create the parent directory of a data file if needed.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn append_file(path: &Path) -> Result<File> {
    ensure_parent(path)?;
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn append_writer(path: &Path) -> Result<Writer<File>> {
    let file = append_file(path)?;
    Ok(WriterBuilder::new().has_headers(false).from_writer(file))
}

/// Append one row per review. The file has no header, so repeated runs can keep appending.
pub fn append_reviews(path: &Path, fragrances: &[FragranceInfo]) -> Result<usize> {
    let mut writer = append_writer(path)?;
    let mut count = 0;
    for record in fragrances.iter().flat_map(|f| f.review_records()) {
        writer.serialize(record)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Append one row of notes per fragrance.
pub fn append_notes(path: &Path, fragrances: &[FragranceInfo]) -> Result<()> {
    let mut writer = append_writer(path)?;
    for fragrance in fragrances {
        writer.serialize(fragrance.note_record())?;
    }
    writer.flush()?;
    Ok(())
}

/// Urls scraped by earlier runs, one per line.
pub fn read_processed_urls(path: &Path) -> Result<HashSet<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashSet::new()),
        Err(e) => Err(e.into()),
    }
}

pub fn append_processed_urls(path: &Path, urls: &[String]) -> Result<()> {
    let mut file = append_file(path)?;
    for url in urls {
        writeln!(file, "{}", url)?;
    }
    Ok(())
}

/// Rewrite the raw review file with a `cleaned_review` column that has newlines
/// replaced by spaces. Returns the number of reviews written.
pub fn cleanup_reviews(raw_path: &Path, clean_path: &Path) -> Result<usize> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(raw_path)?;
    ensure_parent(clean_path)?;
    let mut writer = Writer::from_path(clean_path)?;

    let mut count = 0;
    for result in reader.deserialize::<ReviewRecord>() {
        writer.serialize(CleanReview::from(result?))?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FragNote;
    use std::{collections::BTreeMap, path::PathBuf};
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scraper-storage-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn fragrance() -> FragranceInfo {
        let mut notes = BTreeMap::new();
        notes.insert(FragNote::Top, vec!["Aldehydes".to_string()]);
        FragranceInfo {
            brand: "Chanel".into(),
            name: "No 5".into(),
            notes,
            reviews: vec!["Classic,\nsoapy.".into(), "Timeless".into()],
        }
    }

    #[test]
    fn test_append_and_cleanup_reviews() {
        let dir = temp_dir();
        let raw = dir.join("reviews.csv");
        let clean = dir.join("reviews_cleaned.csv");

        assert_eq!(append_reviews(&raw, &[fragrance()]).unwrap(), 2);
        assert_eq!(append_reviews(&raw, &[fragrance()]).unwrap(), 2);
        assert_eq!(cleanup_reviews(&raw, &clean).unwrap(), 4);

        let contents = fs::read_to_string(&clean).unwrap();
        assert!(contents.starts_with("brand,name,review,cleaned_review\n"));
        assert!(contents.contains("Classic, soapy."));
    }

    #[test]
    fn test_append_notes() {
        let dir = temp_dir();
        let path = dir.join("frag_notes.csv");
        append_notes(&path, &[fragrance()]).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "Chanel,No 5,\"[\"\"Aldehydes\"\"]\",,,\n");
    }

    #[test]
    fn test_processed_urls_round_trip() {
        let dir = temp_dir();
        let path = dir.join("processed_urls.txt");
        assert!(read_processed_urls(&path).unwrap().is_empty());

        append_processed_urls(&path, &["https://a/1".to_string()]).unwrap();
        append_processed_urls(&path, &["https://a/2".to_string()]).unwrap();

        let urls = read_processed_urls(&path).unwrap();
        assert!(urls.contains("https://a/1"));
        assert!(urls.contains("https://a/2"));
        assert_eq!(urls.len(), 2);
    }
}
