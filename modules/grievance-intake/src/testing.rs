//! Test doubles: canned sources, record builders and an in-memory store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grievance_common::{
    GrievanceError, MunicipalityListing, PortalEntry, RawRecord, Result, SocialPost, SourceKind,
    StoreSettings, SubmissionForm,
};
use grievance_store::{GrievanceStore, MemorySheet, SheetStore};

use crate::sources::{SourceAdapter, SourceBatch};

/// Store settings with a generous quota and millisecond backoff.
pub fn fast_store_settings() -> StoreSettings {
    StoreSettings {
        requests_per_minute: 60_000,
        burst: 1_000,
        max_retries: 2,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(4),
    }
}

/// A `SheetStore` over a fresh `MemorySheet`; the sheet is returned for fault injection.
pub fn memory_store() -> (Arc<dyn GrievanceStore>, Arc<MemorySheet>) {
    let sheet = Arc::new(MemorySheet::new());
    let store = SheetStore::new(sheet.clone(), &fast_store_settings());
    (Arc::new(store), sheet)
}

/// Serves fixed pages; the cursor is the index of the page to serve.
pub struct StaticSource {
    name: String,
    kind: SourceKind,
    pages: Vec<Vec<RawRecord>>,
    fetches: AtomicUsize,
    cancel_on: Option<(usize, Arc<AtomicBool>)>,
}

impl StaticSource {
    pub fn paged(name: &str, pages: Vec<Vec<RawRecord>>) -> Self {
        let kind = pages
            .iter()
            .flatten()
            .next()
            .map(RawRecord::source_kind)
            .unwrap_or(SourceKind::PortalScrape);
        Self {
            name: name.to_string(),
            kind,
            pages,
            fetches: AtomicUsize::new(0),
            cancel_on: None,
        }
    }

    pub fn single(name: &str, records: Vec<RawRecord>) -> Self {
        Self::paged(name, vec![records])
    }

    /// Raise `flag` while serving page `page`, before any of its records run.
    pub fn cancelling_on(mut self, page: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel_on = Some((page, flag));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<SourceBatch> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let index = match cursor {
            None => 0,
            Some(c) => c.parse::<usize>().map_err(|e| GrievanceError::SourceFormatChanged {
                adapter: self.name.clone(),
                message: format!("bad cursor {c:?}: {e}"),
            })?,
        };
        if let Some((page, flag)) = &self.cancel_on {
            if *page == index {
                flag.store(true, Ordering::SeqCst);
            }
        }
        let records = self.pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(SourceBatch {
            records,
            next_cursor,
        })
    }
}

/// Fails every fetch with the given error.
pub struct FailingSource {
    name: String,
    kind: SourceKind,
    error: GrievanceError,
}

impl FailingSource {
    pub fn unavailable(name: &str, kind: SourceKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            error: GrievanceError::SourceUnavailable {
                adapter: name.to_string(),
                message: "connection refused".to_string(),
            },
        }
    }

    pub fn format_changed(name: &str, kind: SourceKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            error: GrievanceError::SourceFormatChanged {
                adapter: name.to_string(),
                message: "no complaint listings found".to_string(),
            },
        }
    }
}

#[async_trait]
impl SourceAdapter for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, _cursor: Option<&str>) -> Result<SourceBatch> {
        Err(self.error.clone())
    }
}

// --- Record builders ---

pub fn submission(heading: &str, description: &str, city: &str) -> SubmissionForm {
    SubmissionForm {
        heading: Some(heading.to_string()),
        description: description.to_string(),
        city: Some(city.to_string()),
        email: Some("resident@example.org".to_string()),
        ..Default::default()
    }
}

pub fn portal_entry(portal: &str, complaint_id: &str, title: &str) -> RawRecord {
    RawRecord::Portal(PortalEntry {
        portal: portal.to_string(),
        complaint_id: Some(complaint_id.to_string()),
        title: Some(title.to_string()),
        details: format!("{title}. Residents have raised this several times."),
        department: Some("public works".to_string()),
        area: Some("Ward 12".to_string()),
        filed_at: None,
    })
}

/// A listing without a complaint number, so it dedups by similarity.
pub fn municipality_listing(municipality: &str, heading: &str, locality: &str) -> RawRecord {
    RawRecord::Municipality(MunicipalityListing {
        municipality: municipality.to_string(),
        page_url: "https://municipality.example/grievances".to_string(),
        listing_id: None,
        heading: Some(heading.to_string()),
        body: format!("{heading}. Listed on the municipal grievance page."),
        category: None,
        locality: Some(locality.to_string()),
        posted_at: None,
    })
}

pub fn social_post(post_id: &str, text: &str) -> RawRecord {
    RawRecord::Social(SocialPost {
        platform: "x".to_string(),
        post_id: Some(post_id.to_string()),
        url: Some(format!("https://x.com/resident/status/{post_id}")),
        author: Some("resident".to_string()),
        text: text.to_string(),
        place: Some("Delhi".to_string()),
        coordinates: None,
        hashtags: Vec::new(),
        posted_at: None,
    })
}
