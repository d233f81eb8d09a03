//! Source-shaped input records.
//!
//! Each ingestion source yields its own loosely-populated shape. The `RawRecord`
//! sum type tags them so the normalizer can map every variant exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SourceKind;

/// Citizen-entered form fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionForm {
    pub heading: Option<String>,
    pub description: String,
    pub category: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One complaint listed on a municipal web page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityListing {
    pub municipality: String,
    pub page_url: String,
    /// Stable per-listing anchor or complaint number, when the page shows one.
    pub listing_id: Option<String>,
    pub heading: Option<String>,
    pub body: String,
    pub category: Option<String>,
    pub locality: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// One entry from a paginated grievance portal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortalEntry {
    pub portal: String,
    pub complaint_id: Option<String>,
    pub title: Option<String>,
    pub details: String,
    pub department: Option<String>,
    pub area: Option<String>,
    pub filed_at: Option<DateTime<Utc>>,
}

/// A public social-media post matched by a civic search query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub platform: String,
    pub post_id: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub text: String,
    pub place: Option<String>,
    pub coordinates: Option<(f64, f64)>,
    pub hashtags: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RawRecord {
    UserSubmission(SubmissionForm),
    Municipality(MunicipalityListing),
    Portal(PortalEntry),
    Social(SocialPost),
}

impl RawRecord {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            RawRecord::UserSubmission(_) => SourceKind::UserSubmission,
            RawRecord::Municipality(_) => SourceKind::MunicipalityScrape,
            RawRecord::Portal(_) => SourceKind::PortalScrape,
            RawRecord::Social(_) => SourceKind::SocialScrape,
        }
    }
}
