use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GrievanceError, Result};

/// Category assigned when a source does not provide one.
pub const DEFAULT_CATEGORY: &str = "uncategorized";

// --- Source Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    UserSubmission,
    MunicipalityScrape,
    PortalScrape,
    SocialScrape,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::UserSubmission => write!(f, "user_submission"),
            SourceKind::MunicipalityScrape => write!(f, "municipality_scrape"),
            SourceKind::PortalScrape => write!(f, "portal_scrape"),
            SourceKind::SocialScrape => write!(f, "social_scrape"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = GrievanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "user_submission" | "user" | "submission" => Ok(Self::UserSubmission),
            "municipality_scrape" | "municipality" => Ok(Self::MunicipalityScrape),
            "portal_scrape" | "portal" => Ok(Self::PortalScrape),
            "social_scrape" | "social" | "twitter" => Ok(Self::SocialScrape),
            other => Err(GrievanceError::Normalization(format!(
                "unknown source kind: {other}"
            ))),
        }
    }
}

impl SourceKind {
    pub fn is_scraped(self) -> bool {
        !matches!(self, SourceKind::UserSubmission)
    }

    /// Ticket id prefix: citizen submissions vs. scraped records.
    pub fn ticket_prefix(self) -> &'static str {
        match self {
            SourceKind::UserSubmission => "CS",
            _ => "SC",
        }
    }
}

// --- Lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrievanceStatus {
    New,
    Acknowledged,
    InProgress,
    Resolved,
    Closed,
    Rejected,
}

impl std::fmt::Display for GrievanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrievanceStatus::New => write!(f, "new"),
            GrievanceStatus::Acknowledged => write!(f, "acknowledged"),
            GrievanceStatus::InProgress => write!(f, "in_progress"),
            GrievanceStatus::Resolved => write!(f, "resolved"),
            GrievanceStatus::Closed => write!(f, "closed"),
            GrievanceStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for GrievanceStatus {
    type Err = GrievanceError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "new" => Ok(Self::New),
            "acknowledged" => Ok(Self::Acknowledged),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            "rejected" => Ok(Self::Rejected),
            other => Err(GrievanceError::Normalization(format!(
                "unknown status: {other}"
            ))),
        }
    }
}

impl GrievanceStatus {
    pub const ALL: [GrievanceStatus; 6] = [
        GrievanceStatus::New,
        GrievanceStatus::Acknowledged,
        GrievanceStatus::InProgress,
        GrievanceStatus::Resolved,
        GrievanceStatus::Closed,
        GrievanceStatus::Rejected,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, GrievanceStatus::Closed | GrievanceStatus::Rejected)
    }

    /// The single forward edge out of this state, if any.
    fn successor(self) -> Option<GrievanceStatus> {
        match self {
            GrievanceStatus::New => Some(GrievanceStatus::Acknowledged),
            GrievanceStatus::Acknowledged => Some(GrievanceStatus::InProgress),
            GrievanceStatus::InProgress => Some(GrievanceStatus::Resolved),
            GrievanceStatus::Resolved => Some(GrievanceStatus::Closed),
            GrievanceStatus::Closed | GrievanceStatus::Rejected => None,
        }
    }

    /// Adjacent forward step, or the direct New -> Rejected edge.
    pub fn can_transition_to(self, next: GrievanceStatus) -> bool {
        self.successor() == Some(next)
            || (self == GrievanceStatus::New && next == GrievanceStatus::Rejected)
    }
}

// --- Location ---

static COORDINATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-?\d{1,3}(?:\.\d+)?)\s*,\s*(-?\d{1,3}(?:\.\d+)?)\s*$")
        .expect("coordinate pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    Place { text: String },
    Point { lat: f64, lng: f64 },
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Place { text } => write!(f, "{text}"),
            Location::Point { lat, lng } => write!(f, "{lat:.6},{lng:.6}"),
        }
    }
}

impl Location {
    pub fn place(text: impl Into<String>) -> Self {
        Location::Place { text: text.into() }
    }

    /// Parse a stored cell. Empty input means no location; a valid
    /// `lat,lng` pair becomes a point, anything else stays free text.
    pub fn parse(cell: &str) -> Option<Location> {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(caps) = COORDINATES.captures(trimmed) {
            let lat: f64 = caps[1].parse().ok()?;
            let lng: f64 = caps[2].parse().ok()?;
            if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) {
                return Some(Location::Point { lat, lng });
            }
        }
        Some(Location::place(trimmed))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submitter {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Submitter {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

// --- Canonical record ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grievance {
    pub ticket_id: String,
    pub source: SourceKind,
    pub source_ref: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<Submitter>,
    pub status: GrievanceStatus,
    #[serde(default, skip_serializing)]
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Grievance {
    /// Validate a status change against the lifecycle without mutating anything.
    pub fn check_transition(&self, next: GrievanceStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(GrievanceError::TerminalRecord {
                ticket_id: self.ticket_id.clone(),
                status: self.status,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(GrievanceError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        Ok(())
    }
}

/// Normalized record awaiting identity: no ticket id, fingerprint or version yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrievanceDraft {
    pub source: SourceKind,
    pub source_ref: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: Option<Location>,
    pub submitter: Option<Submitter>,
    /// When the grievance was raised at its source.
    pub reported_at: DateTime<Utc>,
    /// When this pipeline ingested it.
    pub observed_at: DateTime<Utc>,
}

impl GrievanceDraft {
    pub fn has_source_ref(&self) -> bool {
        !self.source_ref.trim().is_empty()
    }
}

/// Field changes applied by `update`. `touched_at` becomes the new
/// `updated_at` unless the stored value is already later.
#[derive(Debug, Clone, PartialEq)]
pub struct GrievancePatch {
    pub description: Option<String>,
    pub location: Option<Location>,
    pub status: Option<GrievanceStatus>,
    pub touched_at: DateTime<Utc>,
}

impl GrievancePatch {
    pub fn touch(at: DateTime<Utc>) -> Self {
        Self {
            description: None,
            location: None,
            status: None,
            touched_at: at,
        }
    }

    pub fn status(status: GrievanceStatus, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            ..Self::touch(at)
        }
    }
}

// --- Listing ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilter {
    pub status: Option<GrievanceStatus>,
    pub source: Option<SourceKind>,
    pub category: Option<String>,
}

impl ListFilter {
    pub fn matches(&self, g: &Grievance) -> bool {
        self.status.map_or(true, |s| g.status == s)
            && self.source.map_or(true, |s| g.source == s)
            && self
                .category
                .as_deref()
                .map_or(true, |c| g.category.eq_ignore_ascii_case(c.trim()))
    }
}

pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: MAX_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

// --- Aggregation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Status,
    Category,
    Source,
    Location,
}

impl GroupBy {
    pub fn key_of(self, g: &Grievance) -> String {
        match self {
            GroupBy::Status => g.status.to_string(),
            GroupBy::Category => g.category.clone(),
            GroupBy::Source => g.source.to_string(),
            GroupBy::Location => g
                .location
                .as_ref()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unspecified".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrievanceStats {
    pub total_grievances: usize,
    pub open_grievances: usize,
    pub resolved_grievances: usize,
    pub rejected_grievances: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub by_location: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grievance(status: GrievanceStatus) -> Grievance {
        let now = Utc::now();
        Grievance {
            ticket_id: "CS0000ABCD".to_string(),
            source: SourceKind::UserSubmission,
            source_ref: String::new(),
            title: "Pothole".to_string(),
            description: "Pothole on Main St".to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            location: None,
            submitter: None,
            status,
            fingerprint: String::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn forward_edges_are_allowed() {
        use GrievanceStatus::*;
        assert!(New.can_transition_to(Acknowledged));
        assert!(Acknowledged.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Closed));
        assert!(New.can_transition_to(Rejected));
    }

    #[test]
    fn skipping_states_is_rejected() {
        let g = grievance(GrievanceStatus::New);
        assert_eq!(
            g.check_transition(GrievanceStatus::Resolved),
            Err(GrievanceError::InvalidTransition {
                from: GrievanceStatus::New,
                to: GrievanceStatus::Resolved,
            })
        );
    }

    #[test]
    fn rejection_only_from_new() {
        let g = grievance(GrievanceStatus::Acknowledged);
        assert!(matches!(
            g.check_transition(GrievanceStatus::Rejected),
            Err(GrievanceError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn self_transition_is_invalid() {
        let g = grievance(GrievanceStatus::InProgress);
        assert!(g.check_transition(GrievanceStatus::InProgress).is_err());
    }

    #[test]
    fn terminal_records_refuse_every_target() {
        for terminal in [GrievanceStatus::Closed, GrievanceStatus::Rejected] {
            let g = grievance(terminal);
            for target in GrievanceStatus::ALL {
                assert!(matches!(
                    g.check_transition(target),
                    Err(GrievanceError::TerminalRecord { .. })
                ));
            }
        }
    }

    #[test]
    fn status_parses_loosely() {
        assert_eq!("In Progress".parse::<GrievanceStatus>(), Ok(GrievanceStatus::InProgress));
        assert_eq!("in-progress".parse::<GrievanceStatus>(), Ok(GrievanceStatus::InProgress));
        assert_eq!("CLOSED".parse::<GrievanceStatus>(), Ok(GrievanceStatus::Closed));
        assert!("pending".parse::<GrievanceStatus>().is_err());
    }

    #[test]
    fn status_display_parses_back() {
        for status in GrievanceStatus::ALL {
            assert_eq!(status.to_string().parse::<GrievanceStatus>(), Ok(status));
        }
    }

    #[test]
    fn location_cell_detects_coordinates() {
        assert_eq!(
            Location::parse("28.6139, 77.2090"),
            Some(Location::Point { lat: 28.6139, lng: 77.2090 })
        );
        assert_eq!(
            Location::parse("Sector 17, Chandigarh"),
            Some(Location::place("Sector 17, Chandigarh"))
        );
        assert_eq!(Location::parse("   "), None);
    }

    #[test]
    fn out_of_range_pair_stays_text() {
        assert_eq!(Location::parse("120, 45"), Some(Location::place("120, 45")));
    }

    #[test]
    fn page_request_clamps_limit() {
        assert_eq!(PageRequest::new(0, 0).limit, 1);
        assert_eq!(PageRequest::new(5, 500).limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn fingerprint_is_not_serialized() {
        let mut g = grievance(GrievanceStatus::New);
        g.fingerprint = "secret".to_string();
        let json = serde_json::to_string(&g).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("fingerprint"));
    }

    #[test]
    fn filter_matches_category_case_insensitively() {
        let mut g = grievance(GrievanceStatus::New);
        g.category = "Roads".to_string();
        let filter = ListFilter {
            category: Some("roads".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&g));
        let filter = ListFilter {
            status: Some(GrievanceStatus::Closed),
            ..Default::default()
        };
        assert!(!filter.matches(&g));
    }
}
