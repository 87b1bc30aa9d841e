//! Extraction of brand links, fragrance links, notes and reviews from basenotes markup.

use crate::{
    error::{ApiError, Result},
    models::FragNote,
};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

lazy_static! {
    static ref BRAND_LINK: Regex = Regex::new(r"^.+\?brand=.+\d{6}").unwrap();
    static ref FRAGRANCE_LINK: Regex = Regex::new(r"^.+\d{8}").unwrap();
    static ref ANCHOR: Selector = Selector::parse("a[href]").unwrap();
    static ref FRAGRANCE_CARD: Selector = Selector::parse(".bncard.card6").unwrap();
    static ref FIRST_ANCHOR: Selector = Selector::parse("a").unwrap();
    static ref ORDERED_LIST: Selector = Selector::parse("ol").unwrap();
    static ref INFO_HEADER: Selector = Selector::parse(".bnfraginfoheader").unwrap();
    static ref ITEMPROP: Selector = Selector::parse("[itemprop]").unwrap();
    static ref REVIEW_TEXT: Selector = Selector::parse(".reviewtext").unwrap();
}

/// Name, brand and notes from a fragrance page.
#[derive(Debug, Clone, PartialEq)]
pub struct FragrancePage {
    pub brand: String,
    pub name: String,
    pub notes: BTreeMap<FragNote, Vec<String>>,
}

/// Links to the most popular brands on the fragrance listing page, rewritten
/// to list each brand's fragrances by popularity.
pub fn brand_urls(listing_html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(listing_html);

    let mut urls: Vec<String> = Vec::new();
    for url in document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| BRAND_LINK.is_match(href))
        .filter_map(|href| brand_listing_url(base_url, href))
    {
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

// `{base}/fragrances/?orderby=popular&brand=...`, keeping the link's own query
fn brand_listing_url(base_url: &Url, href: &str) -> Option<String> {
    let link = base_url.join(href).ok()?;
    let brand_query = link.query().filter(|q| !q.is_empty())?;

    let mut listing = base_url.join("/fragrances/").ok()?;
    listing.set_query(Some(&format!("orderby=popular&{}", brand_query)));
    Some(listing.into())
}

/// Up to `limit` fragrance page links from a brand listing, resolved against `base_url`.
pub fn fragrance_urls(brand_html: &str, base_url: &Url, limit: usize) -> Vec<String> {
    let document = Html::parse_document(brand_html);

    document
        .select(&FRAGRANCE_CARD)
        .filter_map(|card| card.select(&FIRST_ANCHOR).next())
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| FRAGRANCE_LINK.is_match(href))
        .filter_map(|href| base_url.join(href).ok())
        .map(String::from)
        .take(limit)
        .collect()
}

pub fn parse_fragrance_page(html: &str) -> Result<FragrancePage> {
    let document = Html::parse_document(html);

    let header = document
        .select(&INFO_HEADER)
        .next()
        .ok_or_else(|| ApiError::ScrapeError("Fragrance header not found".to_string()))?;
    let name = itemprop_text(header, "name")
        .ok_or_else(|| ApiError::ScrapeError("Fragrance name not found".to_string()))?;
    let brand = itemprop_text(header, "brand")
        .ok_or_else(|| ApiError::ScrapeError("Fragrance brand not found".to_string()))?;

    let notes = document
        .select(&ORDERED_LIST)
        .next()
        .map(parse_notes)
        .unwrap_or_default();

    Ok(FragrancePage { brand, name, notes })
}

/// Trimmed text of every review on a fragrance's review page. Blank reviews
/// are dropped since there is nothing to embed.
pub fn parse_reviews(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&REVIEW_TEXT)
        .map(|review| element_text(review).trim().to_string())
        .filter(|review| !review.is_empty())
        .collect()
}

// Labelled sections look like "Top Notes\n\tBergamot\n\tLemon". Pages without
// labels fall back to the whole list split on blank lines.
fn parse_notes(list: ElementRef) -> BTreeMap<FragNote, Vec<String>> {
    let mut notes: BTreeMap<FragNote, Vec<String>> = BTreeMap::new();

    for child in list.children().filter_map(ElementRef::wrap) {
        let text = element_text(child);
        if !text.contains("Notes") {
            continue;
        }

        let mut lines = text
            .replace('\t', "")
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into_iter();

        if let Some(heading) = lines.next() {
            notes
                .entry(FragNote::from_heading(&heading))
                .or_default()
                .extend(lines);
        }
    }

    for values in notes.values_mut() {
        values.sort();
    }

    if notes.values().all(Vec::is_empty) {
        let mut unknown: Vec<String> = element_text(list)
            .trim()
            .split("\n\n")
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty())
            .collect();
        unknown.sort();

        notes.clear();
        if !unknown.is_empty() {
            notes.insert(FragNote::Unknown, unknown);
        }
    }

    notes
}

fn itemprop_text(root: ElementRef, prop: &str) -> Option<String> {
    root.select(&ITEMPROP)
        .find(|el| {
            el.value()
                .attr("itemprop")
                .map_or(false, |value| value.eq_ignore_ascii_case(prop))
        })
        .map(|el| element_text(el).trim().to_string())
        .filter(|text| !text.is_empty())
}

fn element_text(element: ElementRef) -> String {
    element.text().collect()
}
