use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use grievance_common::{MunicipalityListing, RawRecord, Result, SourceKind};
use regex::Regex;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tracing::{info, warn};

use super::{format_changed, get_text, SourceAdapter, SourceBatch};

/// Words that mark a section as describing a civic complaint rather than
/// site navigation.
const GRIEVANCE_KEYWORDS: &[&str] = &[
    "complaint", "grievance", "issue", "problem", "request", "repair", "broken",
    "not working", "pothole", "garbage", "waste", "sewage", "drain", "water",
    "street light", "streetlight", "road",
];

static LISTING_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:complaint|grievance|ticket|ref(?:erence)?)\b\s*(?i:no\.?|number|id)?\s*[:#]?\s*([A-Z0-9][A-Z0-9/-]{3,})")
        .expect("listing id pattern is valid")
});

static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[*_]*\s*(category|type|department|location|area|ward|locality|date|posted|filed)\s*[*_]*\s*:\s*[*_]*\s*(.+?)\s*$")
        .expect("field pattern is valid")
});

/// Scrapes a municipal complaints page. Not paginated: one fetch per cycle.
pub struct MunicipalityScraper {
    client: reqwest::Client,
    name: String,
    url: String,
}

impl MunicipalityScraper {
    pub fn new(client: reqwest::Client, name: String, url: String) -> Self {
        Self { client, name, url }
    }
}

#[async_trait]
impl SourceAdapter for MunicipalityScraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::MunicipalityScrape
    }

    async fn fetch(&self, _cursor: Option<&str>) -> Result<SourceBatch> {
        info!(source = %self.name, url = %self.url, "Scraping municipal page");
        let html = get_text(&self.client, &self.name, &self.url).await?;
        let markdown = html_to_markdown(&self.url, &html);
        if markdown.trim().is_empty() {
            warn!(source = %self.name, url = %self.url, "Empty content after Readability extraction");
            return Err(format_changed(&self.name, "page has no readable content"));
        }

        let listings = listings_from_markdown(&self.name, &self.url, &markdown)
            .map_err(|e| format_changed(&self.name, e))?;
        info!(source = %self.name, listings = listings.len(), "Extracted municipal listings");
        Ok(SourceBatch::last(
            listings.into_iter().map(RawRecord::Municipality).collect(),
        ))
    }
}

fn html_to_markdown(url: &str, html: &str) -> String {
    let parsed_url = url::Url::parse(url).ok();
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };
    transform_content_input(input, &config)
}

struct Section {
    heading: String,
    lines: Vec<String>,
}

fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    rest.starts_with(' ').then(|| rest.trim().trim_end_matches('#').trim())
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d", "%d %b %Y", "%d %B %Y", "%B %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn looks_like_grievance(text: &str) -> bool {
    let lower = text.to_lowercase();
    GRIEVANCE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Split Readability markdown into headed sections and keep the ones that
/// read like complaints. A page with no headings at all means the layout
/// changed under us.
pub fn listings_from_markdown(
    municipality: &str,
    page_url: &str,
    markdown: &str,
) -> std::result::Result<Vec<MunicipalityListing>, String> {
    let mut sections: Vec<Section> = Vec::new();
    for line in markdown.lines() {
        if let Some(heading) = heading_text(line) {
            sections.push(Section {
                heading: heading.to_string(),
                lines: Vec::new(),
            });
        } else if let Some(section) = sections.last_mut() {
            if !line.trim().is_empty() {
                section.lines.push(line.trim().to_string());
            }
        }
    }
    if sections.is_empty() {
        return Err("no headed sections found".to_string());
    }

    let listings = sections
        .into_iter()
        .filter_map(|section| {
            let mut listing = MunicipalityListing {
                municipality: municipality.to_string(),
                page_url: page_url.to_string(),
                ..Default::default()
            };
            let mut body = Vec::new();
            for line in &section.lines {
                match FIELD_LINE.captures(line) {
                    Some(caps) => {
                        let value = caps[2].to_string();
                        match caps[1].to_lowercase().as_str() {
                            "category" | "type" | "department" => listing.category = Some(value),
                            "location" | "area" | "ward" | "locality" => {
                                listing.locality = Some(value)
                            }
                            _ => listing.posted_at = parse_date(&value),
                        }
                    }
                    None => body.push(line.as_str()),
                }
            }

            let heading = section.heading.trim().to_string();
            listing.body = if body.is_empty() {
                // A bare heading only counts when it reads like a sentence.
                if heading.split_whitespace().count() < 3 {
                    return None;
                }
                heading.clone()
            } else {
                body.join(" ")
            };
            if !looks_like_grievance(&format!("{heading} {}", listing.body)) {
                return None;
            }
            listing.listing_id = LISTING_ID
                .captures_iter(&format!("{heading} {}", listing.body))
                .map(|caps| caps[1].to_string())
                .find(|id| id.chars().any(|c| c.is_ascii_digit()));
            listing.heading = (!heading.is_empty()).then_some(heading);
            Some(listing)
        })
        .collect();
    Ok(listings)
}
