//! Source adapters: one per external origin of grievance records.
//!
//! Each adapter yields finite pages of raw records. Paginated sources hand
//! back a cursor for the next page; single-page sources return none.

pub mod municipality;
pub mod portal;
pub mod social;

use std::sync::Arc;

use async_trait::async_trait;
use grievance_common::{Config, GrievanceError, RawRecord, Result, ScrapeSettings, SourceKind};
use tracing::{info, warn};

pub use municipality::MunicipalityScraper;
pub use portal::PortalScraper;
pub use social::SocialScraper;

/// One page of a scrape cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBatch {
    pub records: Vec<RawRecord>,
    pub next_cursor: Option<String>,
}

impl SourceBatch {
    pub fn last(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            next_cursor: None,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique adapter name; `scrape-one` matches it case-insensitively.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Fetch one page. Failures are `SourceUnavailable` (transport) or
    /// `SourceFormatChanged` (the response no longer parses).
    async fn fetch(&self, cursor: Option<&str>) -> Result<SourceBatch>;
}

pub(crate) fn http_client(settings: &ScrapeSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.timeout)
        .build()
        .map_err(|e| GrievanceError::Config(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn unavailable(adapter: &str, err: impl std::fmt::Display) -> GrievanceError {
    GrievanceError::SourceUnavailable {
        adapter: adapter.to_string(),
        message: err.to_string(),
    }
}

pub(crate) fn format_changed(adapter: &str, err: impl std::fmt::Display) -> GrievanceError {
    GrievanceError::SourceFormatChanged {
        adapter: adapter.to_string(),
        message: err.to_string(),
    }
}

/// GET a URL, mapping transport failures and non-2xx statuses to `SourceUnavailable`.
pub(crate) async fn get_text(client: &reqwest::Client, adapter: &str, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| unavailable(adapter, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(unavailable(adapter, format!("GET {url} returned {status}")));
    }
    resp.text().await.map_err(|e| unavailable(adapter, e))
}

/// Every adapter the configuration enables.
pub fn build_sources(config: &Config) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let scrape = &config.scrape;
    let client = http_client(scrape)?;
    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    for endpoint in &scrape.municipality_portals {
        sources.push(Arc::new(MunicipalityScraper::new(
            client.clone(),
            endpoint.name.clone(),
            endpoint.url.clone(),
        )));
    }
    for endpoint in &scrape.portal_feeds {
        sources.push(Arc::new(PortalScraper::new(
            client.clone(),
            endpoint.name.clone(),
            endpoint.url.clone(),
        )));
    }
    match &config.apify_api_key {
        Some(key) if !scrape.social_queries.is_empty() => {
            sources.push(Arc::new(SocialScraper::new(
                apify_client::ApifyClient::new(key.clone()),
                scrape.social_queries.clone(),
                scrape.social_max_items,
            )));
        }
        Some(_) => warn!("SOCIAL_QUERIES is empty, skipping social media scraping"),
        None => warn!("APIFY_API_KEY not set, skipping social media scraping"),
    }

    info!(count = sources.len(), "Configured grievance sources");
    Ok(sources)
}
