use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GrievanceError, Result};

/// Municipal portals scraped when `MUNICIPALITY_PORTALS` is not set.
const DEFAULT_MUNICIPALITY_PORTALS: &[(&str, &str)] = &[
    (
        "Municipal Corporation of Delhi",
        "https://mcdonline.nic.in/grievanceredressal/",
    ),
    ("Swachh Bharat Mission", "https://swachhbharat.mygov.in/"),
    (
        "Chandigarh Municipal Corporation",
        "https://mcchandigarh.gov.in/complaints",
    ),
];

/// Social search terms used when `SOCIAL_QUERIES` is not set.
const DEFAULT_SOCIAL_QUERIES: &[&str] = &[
    "pothole complaint",
    "garbage disposal problem",
    "street light not working",
    "water supply issue",
    "sewage problem",
    "municipal corporation",
];

/// Upper bound for dedup windows; wider spans overflow timestamp arithmetic.
const MAX_SPAN_DAYS: i64 = 36_500;

/// A configured scrape target: display name plus endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedEndpoint {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetsSettings {
    pub spreadsheet_id: Option<String>,
    pub access_token: Option<String>,
    pub tab: String,
}

/// Backing-store quota and retry tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub requests_per_minute: u32,
    pub burst: u32,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst: 10,
            max_retries: 5,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupSettings {
    /// Minimum title token overlap for two identifier-less records to merge.
    pub similarity_threshold: f64,
    /// Records not updated within this window are no longer dedup candidates.
    pub horizon: chrono::Duration,
    /// Window in which an identical citizen submission counts as a double-submit.
    pub submission_window: chrono::Duration,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            horizon: chrono::Duration::days(90),
            submission_window: chrono::Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub workers: usize,
    pub max_pages: usize,
    pub municipality_portals: Vec<NamedEndpoint>,
    pub portal_feeds: Vec<NamedEndpoint>,
    pub social_queries: Vec<String>,
    pub social_max_items: u32,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            user_agent: "GrievanceRedressalBot/1.0".to_string(),
            timeout: Duration::from_secs(30),
            workers: 4,
            max_pages: 10,
            municipality_portals: DEFAULT_MUNICIPALITY_PORTALS
                .iter()
                .map(|(name, url)| NamedEndpoint {
                    name: name.to_string(),
                    url: url.to_string(),
                })
                .collect(),
            portal_feeds: Vec::new(),
            social_queries: DEFAULT_SOCIAL_QUERIES.iter().map(|q| q.to_string()).collect(),
            social_max_items: 100,
        }
    }
}

/// Application configuration loaded from environment variables.
/// Credentials are opaque strings; nothing here acquires or refreshes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sheets: SheetsSettings,
    pub apify_api_key: Option<String>,
    pub store: StoreSettings,
    pub dedup: DedupSettings,
    pub scrape: ScrapeSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let store_defaults = StoreSettings::default();
        let dedup_defaults = DedupSettings::default();
        let scrape_defaults = ScrapeSettings::default();

        let similarity_threshold: f64 =
            parse_env("DEDUP_SIMILARITY_THRESHOLD", dedup_defaults.similarity_threshold)?;
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(GrievanceError::Config(format!(
                "DEDUP_SIMILARITY_THRESHOLD must be within 0.0..=1.0, got {similarity_threshold}"
            )));
        }

        let config = Self {
            sheets: SheetsSettings {
                spreadsheet_id: optional_env("SHEETS_SPREADSHEET_ID"),
                access_token: optional_env("SHEETS_ACCESS_TOKEN"),
                tab: optional_env("SHEETS_TAB").unwrap_or_else(|| "Grievances".to_string()),
            },
            apify_api_key: optional_env("APIFY_API_KEY"),
            store: StoreSettings {
                requests_per_minute: parse_env(
                    "STORE_REQUESTS_PER_MINUTE",
                    store_defaults.requests_per_minute,
                )?
                .max(1),
                burst: parse_env("STORE_BURST", store_defaults.burst)?.max(1),
                max_retries: parse_env("STORE_MAX_RETRIES", store_defaults.max_retries)?,
                backoff_base: Duration::from_millis(parse_env(
                    "STORE_BACKOFF_BASE_MS",
                    store_defaults.backoff_base.as_millis() as u64,
                )?),
                backoff_max: Duration::from_millis(parse_env(
                    "STORE_BACKOFF_MAX_MS",
                    store_defaults.backoff_max.as_millis() as u64,
                )?),
            },
            dedup: DedupSettings {
                similarity_threshold,
                horizon: bounded_span(
                    "DEDUP_HORIZON_DAYS",
                    parse_env("DEDUP_HORIZON_DAYS", dedup_defaults.horizon.num_days())?,
                    MAX_SPAN_DAYS,
                    chrono::Duration::try_days,
                )?,
                submission_window: bounded_span(
                    "SUBMISSION_WINDOW_HOURS",
                    parse_env(
                        "SUBMISSION_WINDOW_HOURS",
                        dedup_defaults.submission_window.num_hours(),
                    )?,
                    MAX_SPAN_DAYS * 24,
                    chrono::Duration::try_hours,
                )?,
            },
            scrape: ScrapeSettings {
                user_agent: optional_env("SCRAPE_USER_AGENT")
                    .unwrap_or(scrape_defaults.user_agent),
                timeout: Duration::from_secs(parse_env(
                    "SCRAPE_TIMEOUT_SECS",
                    scrape_defaults.timeout.as_secs(),
                )?),
                workers: parse_env("SCRAPE_WORKERS", scrape_defaults.workers)?.max(1),
                max_pages: parse_env("SCRAPE_MAX_PAGES", scrape_defaults.max_pages)?.max(1),
                municipality_portals: match optional_env("MUNICIPALITY_PORTALS") {
                    Some(raw) => parse_endpoints("MUNICIPALITY_PORTALS", &raw)?,
                    None => scrape_defaults.municipality_portals,
                },
                portal_feeds: match optional_env("PORTAL_FEEDS") {
                    Some(raw) => parse_endpoints("PORTAL_FEEDS", &raw)?,
                    None => scrape_defaults.portal_feeds,
                },
                social_queries: match optional_env("SOCIAL_QUERIES") {
                    Some(raw) => split_list(&raw, ','),
                    None => scrape_defaults.social_queries,
                },
                social_max_items: parse_env("SOCIAL_MAX_ITEMS", scrape_defaults.social_max_items)?,
            },
        };

        Ok(config)
    }

    pub fn log_redacted(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  SHEETS_SPREADSHEET_ID: {}", preview_opt(&self.sheets.spreadsheet_id));
        tracing::info!("  SHEETS_ACCESS_TOKEN: {}", preview_opt(&self.sheets.access_token));
        tracing::info!("  SHEETS_TAB: {}", self.sheets.tab);
        tracing::info!("  APIFY_API_KEY: {}", preview_opt(&self.apify_api_key));
        tracing::info!(
            "  store: {} req/min (burst {}), {} retries",
            self.store.requests_per_minute,
            self.store.burst,
            self.store.max_retries
        );
        tracing::info!(
            "  dedup: threshold {:.2}, horizon {}d",
            self.dedup.similarity_threshold,
            self.dedup.horizon.num_days()
        );
        tracing::info!(
            "  scrape: {} workers, {} municipal portals, {} portal feeds, {} social queries",
            self.scrape.workers,
            self.scrape.municipality_portals.len(),
            self.scrape.portal_feeds.len(),
            self.scrape.social_queries.len()
        );
    }
}

fn preview_opt(val: &Option<String>) -> String {
    match val {
        Some(v) if !v.is_empty() => {
            let head: String = v.chars().take(4).collect();
            format!("{}...({} chars)", head, v.chars().count())
        }
        _ => "<not set>".to_string(),
    }
}

/// A strictly positive span of at most `max` units.
fn bounded_span(
    key: &str,
    value: i64,
    max: i64,
    build: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration> {
    if value <= 0 || value > max {
        return Err(GrievanceError::Config(format!(
            "{key} must be within 1..={max}, got {value}"
        )));
    }
    build(value).ok_or_else(|| GrievanceError::Config(format!("{key}={value} is out of range")))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| GrievanceError::Config(format!("{key}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `name|url;name|url` entries.
pub(crate) fn parse_endpoints(key: &str, raw: &str) -> Result<Vec<NamedEndpoint>> {
    split_list(raw, ';')
        .into_iter()
        .map(|entry| {
            let (name, url) = entry.split_once('|').ok_or_else(|| {
                GrievanceError::Config(format!("{key}: expected name|url, got {entry:?}"))
            })?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(GrievanceError::Config(format!(
                    "{key}: invalid entry {entry:?}"
                )));
            }
            Ok(NamedEndpoint {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}
